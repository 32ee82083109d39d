//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table.

mod messages; // messages (append-only conversation turns)
mod users;    // users (phone-derived identities)
