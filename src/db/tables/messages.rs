//! Conversation turn database operations

use chrono::{DateTime, Utc};
use rusqlite::Result as SqliteResult;

use super::super::Database;
use crate::models::ConversationTurn;

fn row_to_turn(row: &rusqlite::Row) -> rusqlite::Result<ConversationTurn> {
    let created_at_str: String = row.get(6)?;
    Ok(ConversationTurn {
        id: row.get(0)?,
        user_id: row.get(1)?,
        text: row.get(2)?,
        media: row.get(3)?,
        is_bot: row.get::<_, i32>(4)? != 0,
        tag: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .unwrap()
            .with_timezone(&Utc),
    })
}

impl Database {
    /// Append one turn. Empty text/media/tag are stored as NULL.
    pub fn save_turn(
        &self,
        user_id: &str,
        text: Option<&str>,
        media: Option<&str>,
        is_bot: bool,
        tag: Option<&str>,
    ) -> SqliteResult<ConversationTurn> {
        let conn = self.conn.lock().unwrap();
        let created_at = Utc::now();

        let text = text.filter(|t| !t.is_empty());
        let media = media.filter(|m| !m.is_empty());
        let tag = tag.filter(|t| !t.is_empty());

        conn.execute(
            "INSERT INTO messages (user_id, text, media, is_bot, tag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                user_id,
                text,
                media,
                if is_bot { 1 } else { 0 },
                tag,
                &created_at.to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();

        Ok(ConversationTurn {
            id,
            user_id: user_id.to_string(),
            text: text.map(|t| t.to_string()),
            media: media.map(|m| m.to_string()),
            is_bot,
            tag: tag.map(|t| t.to_string()),
            created_at,
        })
    }

    /// Most recent turns for a user, most-recent-first.
    pub fn get_recent(&self, user_id: &str, limit: usize) -> SqliteResult<Vec<ConversationTurn>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, user_id, text, media, is_bot, tag, created_at
             FROM messages WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let turns = stmt
            .query_map(rusqlite::params![user_id, limit as i64], row_to_turn)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(turns)
    }

    pub fn count_turns(&self, user_id: &str) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[test]
    fn save_and_get_recent_orders_most_recent_first() {
        let db = Database::new(":memory:").unwrap();
        db.save_turn("+911234", Some("first"), None, false, None)
            .unwrap();
        db.save_turn("+911234", Some("second"), None, true, Some("wheat"))
            .unwrap();
        db.save_turn("+915678", Some("other user"), None, false, None)
            .unwrap();

        let turns = db.get_recent("+911234", 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text.as_deref(), Some("second"));
        assert!(turns[0].is_bot);
        assert_eq!(turns[0].tag.as_deref(), Some("wheat"));
        assert_eq!(turns[1].text.as_deref(), Some("first"));
    }

    #[test]
    fn empty_fields_stored_as_null() {
        let db = Database::new(":memory:").unwrap();
        let turn = db.save_turn("+911234", Some(""), Some(""), true, Some("")).unwrap();
        assert!(turn.text.is_none());
        assert!(turn.media.is_none());
        assert!(turn.tag.is_none());
    }

    #[test]
    fn get_recent_respects_limit() {
        let db = Database::new(":memory:").unwrap();
        for i in 0..7 {
            db.save_turn("+911234", Some(&format!("m{}", i)), None, false, None)
                .unwrap();
        }
        let turns = db.get_recent("+911234", 3).unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text.as_deref(), Some("m6"));
        assert_eq!(db.count_turns("+911234").unwrap(), 7);
    }
}
