//! Outbound delivery: chunking, sequencing, persistence.
//!
//! Every chunk is persisted as a bot turn before its transport send so a
//! transport failure never leaves an unrecorded bot utterance. Chunks go out
//! strictly in ascending order; sends for one logical message are never
//! parallelized.

use std::sync::Arc;

use crate::channels::MessageTransport;
use crate::db::Database;
use crate::session::SessionManager;

/// Transport-safe chunk size, in characters.
pub const MAX_CHUNK_CHARS: usize = 1500;

#[derive(Debug, Clone)]
pub struct ChunkReceipt {
    /// 1-based position within the logical message.
    pub index: usize,
    pub total: usize,
    /// Core chunk text, without the `(i/n)` sequence prefix.
    pub text: String,
    pub persisted: bool,
    pub sent: bool,
}

/// Find the best split point (byte index) within a window that already fits
/// the chunk budget: paragraph, then line, then sentence, then word boundary.
fn find_break(window: &str) -> Option<usize> {
    if let Some(i) = window.rfind("\n\n") {
        return Some(i + 2);
    }
    if let Some(i) = window.rfind('\n') {
        return Some(i + 1);
    }
    for pat in ["। ", ". ", "! ", "? "] {
        if let Some(i) = window.rfind(pat) {
            return Some(i + pat.len());
        }
    }
    window.rfind(' ').map(|i| i + 1)
}

/// Split text into chunks of at most `max_chars` characters. Chunks are exact
/// contiguous substrings of the input: concatenating them reproduces it
/// byte-for-byte.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    loop {
        if rest.chars().count() <= max_chars {
            if !rest.is_empty() {
                chunks.push(rest.to_string());
            }
            break;
        }

        // Byte index of the hard cut: max_chars characters in.
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..hard_end];

        let cut = match find_break(window) {
            // A break at position 0 would make no progress.
            Some(i) if i > 0 => i,
            _ => hard_end,
        };

        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    chunks
}

pub struct OutboundDispatcher {
    db: Arc<Database>,
    sessions: Arc<SessionManager>,
    transport: Arc<dyn MessageTransport>,
}

impl OutboundDispatcher {
    pub fn new(
        db: Arc<Database>,
        sessions: Arc<SessionManager>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        Self {
            db,
            sessions,
            transport,
        }
    }

    /// Chunk, persist, and send one logical message. Persistence happens
    /// before each send; a store failure is logged and the send still goes
    /// out (the farmer-facing message wins over auditability).
    pub async fn deliver(
        &self,
        user_id: &str,
        phone_number: &str,
        text: &str,
        tag: Option<&str>,
    ) -> Vec<ChunkReceipt> {
        if text.is_empty() {
            return Vec::new();
        }

        let chunks = split_message(text, MAX_CHUNK_CHARS);
        let total = chunks.len();
        let mut receipts = Vec::with_capacity(total);

        for (i, chunk) in chunks.into_iter().enumerate() {
            let persisted = match self.db.save_turn(user_id, Some(&chunk), None, true, tag) {
                Ok(turn) => {
                    self.sessions.record_turn(user_id, turn);
                    true
                }
                Err(e) => {
                    log::error!("Failed to persist outbound chunk for {}: {}", user_id, e);
                    false
                }
            };

            let payload = if total > 1 {
                format!("({}/{})\n{}", i + 1, total, chunk)
            } else {
                chunk.clone()
            };

            let sent = match self.transport.send(phone_number, &payload).await {
                Ok(()) => true,
                Err(e) => {
                    // Fire-and-forget channel; the persisted turn stays as the
                    // record of what was said.
                    log::warn!("Transport send failed for {}: {}", phone_number, e);
                    false
                }
            };

            receipts.push(ChunkReceipt {
                index: i + 1,
                total,
                text: chunk,
                persisted,
                sent,
            });
        }

        receipts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MockTransport;

    fn reassemble(chunks: &[String]) -> String {
        chunks.concat()
    }

    #[test]
    fn reassembly_is_exact_across_boundary_lengths() {
        for len in [0usize, 1499, 1500, 1501, 10_000] {
            let text: String = "क"
                .chars()
                .cycle()
                .take(len)
                .collect();
            let chunks = split_message(&text, MAX_CHUNK_CHARS);
            assert_eq!(reassemble(&chunks), text, "length {}", len);
            for chunk in &chunks {
                assert!(chunk.chars().count() <= MAX_CHUNK_CHARS, "length {}", len);
            }
        }
    }

    #[test]
    fn single_chunk_under_limit() {
        let chunks = split_message("छोटा संदेश", MAX_CHUNK_CHARS);
        assert_eq!(chunks, vec!["छोटा संदेश".to_string()]);
    }

    #[test]
    fn chunk_counts_at_boundaries() {
        let make = |n: usize| "x".repeat(n);
        assert_eq!(split_message(&make(1500), 1500).len(), 1);
        assert_eq!(split_message(&make(1501), 1500).len(), 2);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let para_a = "a".repeat(1000);
        let para_b = "b".repeat(1000);
        let text = format!("{}\n\n{}", para_a, para_b);
        let chunks = split_message(&text, 1500);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n\n", para_a));
        assert_eq!(chunks[1], para_b);
    }

    #[test]
    fn prefers_sentence_over_word_breaks() {
        let sentence = format!("{}। ", "क".repeat(800));
        let text = format!("{}{}", sentence, "ख".repeat(1000));
        let chunks = split_message(&text, 1500);
        assert_eq!(chunks[0], sentence);
    }

    #[test]
    fn unbreakable_text_hard_cuts_without_loss() {
        let text = "य".repeat(3200);
        let chunks = split_message(&text, 1500);
        assert_eq!(chunks.len(), 3);
        assert_eq!(reassemble(&chunks), text);
    }

    fn harness() -> (Arc<Database>, Arc<SessionManager>, MockTransport, OutboundDispatcher) {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let sessions = Arc::new(SessionManager::new(db.clone(), 30, 20));
        let transport = MockTransport::new();
        let dispatcher = OutboundDispatcher::new(
            db.clone(),
            sessions.clone(),
            Arc::new(transport.clone()),
        );
        (db, sessions, transport, dispatcher)
    }

    #[tokio::test]
    async fn persists_each_chunk_as_bot_turn_before_send() {
        let (db, _sessions, transport, dispatcher) = harness();
        let text = format!("{}\n\n{}", "a".repeat(1200), "b".repeat(1200));

        let receipts = dispatcher.deliver("+911", "+911", &text, Some("wheat")).await;
        assert_eq!(receipts.len(), 2);
        assert!(receipts.iter().all(|r| r.persisted && r.sent));

        let stored = db.get_recent("+911", 10).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|t| t.is_bot && t.tag.as_deref() == Some("wheat")));

        // Sequence prefixes go to the transport, not the store.
        let sent = transport.sent_texts();
        assert!(sent[0].starts_with("(1/2)\n"));
        assert!(sent[1].starts_with("(2/2)\n"));
        assert!(!stored[0].text_or_empty().starts_with("(2/2)"));
    }

    #[tokio::test]
    async fn single_chunk_has_no_sequence_prefix() {
        let (_db, _sessions, transport, dispatcher) = harness();
        dispatcher.deliver("+911", "+911", "नमस्ते", None).await;
        assert_eq!(transport.sent_texts(), vec!["नमस्ते".to_string()]);
    }

    #[tokio::test]
    async fn empty_text_sends_nothing() {
        let (db, _sessions, transport, dispatcher) = harness();
        let receipts = dispatcher.deliver("+911", "+911", "", None).await;
        assert!(receipts.is_empty());
        assert!(transport.sent().is_empty());
        assert_eq!(db.count_turns("+911").unwrap(), 0);
    }
}
