//! User table database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::UserRecord;

impl Database {
    /// Insert-or-refresh a user keyed by phone-derived identity.
    pub fn save_user(&self, user_id: &str, phone_number: &str, name: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let name = if name.is_empty() { None } else { Some(name) };

        let rows_affected = conn.execute(
            "UPDATE users SET phone_number = ?1, updated_at = ?2,
             name = COALESCE(?3, name) WHERE user_id = ?4",
            rusqlite::params![phone_number, &now, name, user_id],
        )?;

        if rows_affected == 0 {
            conn.execute(
                "INSERT INTO users (user_id, phone_number, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![user_id, phone_number, name, &now],
            )?;
        }

        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> SqliteResult<Option<UserRecord>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT user_id, phone_number, name, created_at, updated_at
             FROM users WHERE user_id = ?1",
        )?;

        let user = stmt
            .query_row([user_id], |row| {
                let created_at_str: String = row.get(3)?;
                let updated_at_str: String = row.get(4)?;

                Ok(UserRecord {
                    user_id: row.get(0)?,
                    phone_number: row.get(1)?,
                    name: row.get(2)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at_str)
                        .unwrap()
                        .with_timezone(&Utc),
                    updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                        .unwrap()
                        .with_timezone(&Utc),
                })
            })
            .ok();

        Ok(user)
    }
}
