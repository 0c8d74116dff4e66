//! Append-only log of inbound SMS bodies.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, Database};
use crate::models::Response;

impl Database {
    pub fn insert_response(&self, response: &Response) -> Result<()> {
        self.conn.execute(
            "INSERT INTO responses (id, phone, body, received_at) VALUES (?, ?, ?, ?)",
            params![
                response.id.to_string(),
                response.phone,
                response.body,
                format_timestamp(&response.received_at),
            ],
        )?;
        Ok(())
    }

    /// All responses, newest first.
    pub fn list_responses(&self) -> Result<Vec<Response>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phone, body, received_at FROM responses ORDER BY received_at DESC, id ASC",
        )?;
        let responses = stmt
            .query_map([], row_to_response)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(responses)
    }

    /// Responses received from exactly this sender string, oldest first.
    pub fn list_responses_from(&self, phone: &str) -> Result<Vec<Response>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phone, body, received_at FROM responses
             WHERE phone = ? ORDER BY received_at ASC, id ASC",
        )?;
        let responses = stmt
            .query_map([phone], row_to_response)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(responses)
    }

    pub fn count_responses(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_response(row: &Row) -> rusqlite::Result<Response> {
    let id: String = row.get(0)?;
    let received_at: String = row.get(3)?;

    Ok(Response {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        phone: row.get(1)?,
        body: row.get(2)?,
        received_at: parse_timestamp(&received_at).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_insert_and_list_responses() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();

        let first = Response::new("+16475551212".into(), "YES".into(), now - Duration::minutes(5));
        let second = Response::new("6475551212".into(), "huh?".into(), now);
        db.insert_response(&first).unwrap();
        db.insert_response(&second).unwrap();

        assert_eq!(db.count_responses().unwrap(), 2);

        let all = db.list_responses().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].body, "YES");

        // Sender kept verbatim, not canonicalized
        let from = db.list_responses_from("6475551212").unwrap();
        assert_eq!(from.len(), 1);
        assert_eq!(from[0].body, "huh?");
    }

    #[test]
    fn test_responses_without_participant() {
        let db = Database::open_memory().unwrap();
        db.insert_response(&Response::new("+19999999999".into(), "hi".into(), Utc::now()))
            .unwrap();
        assert_eq!(db.count_responses().unwrap(), 1);
        assert_eq!(db.count_participants().unwrap(), 0);
    }
}
