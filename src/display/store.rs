//! SQLite-backed display and configuration store.

use super::models::{Display, DEFAULT_DISPLAY_ID};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Well-known per-display configuration keys. Keys starting with an
/// underscore are server-maintained state, the rest are user-editable.
pub mod config_keys {
    /// Crontab-style wakeup schedule, empty meaning "once a day".
    pub const WAKEUP_SCHEDULE: &str = "wakeup_schedule";
    /// Minutes subtracted from "now" before declaring a missed connection.
    pub const ALIVE_CHECK_SAFETY_LAG_MINUTES: &str = "alive_check_safety_lag_minutes";
    /// Missed-cycle count at which the frozen notification fires.
    pub const ALIVE_CHECK_MINIMAL_FAILURE_COUNT: &str = "alive_check_minimal_failure_count";
    /// Whether the display owner opted into Telegram notifications.
    pub const TELEGRAM: &str = "telegram";
    pub const TELEGRAM_API_KEY: &str = "telegram_api_key";
    pub const TELEGRAM_CHAT_ID: &str = "telegram_chat_id";
    /// RFC 3339 instant of the display's last contact.
    pub const LAST_VISIT: &str = "_last_visit";
    /// Number of consecutive detection cycles the display has been overdue.
    pub const MISSED_CONNECTS: &str = "_missed_connects";
    /// Set to "1" once the frozen notification has been sent.
    pub const FROZEN_NOTIFICATION_SENT: &str = "_frozen_notification_sent";
}

/// Access to display records and their configuration values.
///
/// String lookups fall back to the default display (id 0) when the
/// per-display value is absent; an empty string counts as unset since
/// HTML forms submit empty fields for cleared values.
pub trait DisplayStore: Send + Sync {
    fn list_displays(&self) -> Result<Vec<Display>>;

    fn get_display(&self, display_id: i64) -> Result<Option<Display>>;

    /// Insert or replace a display record.
    fn upsert_display(&self, display: &Display) -> Result<()>;

    /// Config value with default-display fallback.
    fn get_string(&self, display_id: i64, name: &str) -> Result<Option<String>>;

    /// Set a config value for this specific display.
    fn set_string(&self, display_id: i64, name: &str, value: &str) -> Result<()>;

    /// Store the freshly rendered image for a display.
    fn store_rendered_image(&self, display_id: i64, png: &[u8]) -> Result<()>;

    /// The last rendered image and its generation instant, if any.
    fn rendered_image(&self, display_id: i64) -> Result<Option<(Vec<u8>, DateTime<Utc>)>>;

    fn get_int(&self, display_id: i64, name: &str) -> Result<Option<i64>> {
        let value = match self.get_string(display_id, name)? {
            Some(v) => v,
            None => return Ok(None),
        };
        match value.parse::<i64>() {
            Ok(n) => Ok(Some(n)),
            Err(_) => {
                warn!(
                    "Config '{}' for display {} is not an integer: '{}'",
                    name, display_id, value
                );
                Ok(None)
            }
        }
    }

    fn get_bool(&self, display_id: i64, name: &str) -> Result<bool> {
        Ok(match self.get_string(display_id, name)? {
            Some(v) => v == "1" || v.eq_ignore_ascii_case("true"),
            None => false,
        })
    }

    /// The instant the display last contacted the server, if recorded.
    fn last_visit(&self, display_id: i64) -> Result<Option<DateTime<Utc>>> {
        let value = match self.get_string(display_id, config_keys::LAST_VISIT)? {
            Some(v) => v,
            None => return Ok(None),
        };
        match DateTime::parse_from_rfc3339(&value) {
            Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
            Err(e) => {
                warn!(
                    "Malformed last visit timestamp for display {}: '{}': {}",
                    display_id, value, e
                );
                Ok(None)
            }
        }
    }

    fn missed_connects(&self, display_id: i64) -> Result<i64> {
        Ok(self
            .get_int(display_id, config_keys::MISSED_CONNECTS)?
            .unwrap_or(0))
    }

    /// Record one more missed detection cycle. Returns the new count.
    fn increase_missed_connects(
        &self,
        display_id: i64,
        expected_at: DateTime<Utc>,
    ) -> Result<i64> {
        let count = self.missed_connects(display_id)? + 1;
        self.set_string(
            display_id,
            config_keys::MISSED_CONNECTS,
            &count.to_string(),
        )?;
        warn!(
            "Increased missed connects count for display {} to {} (expected contact at {})",
            display_id, count, expected_at
        );
        Ok(count)
    }

    /// Called when the display reconnects.
    fn reset_missed_connects(&self, display_id: i64) -> Result<()> {
        self.set_string(display_id, config_keys::MISSED_CONNECTS, "0")
    }
}

/// SQLite-backed display store.
#[derive(Clone)]
pub struct SqliteDisplayStore {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS displays (
    id       INTEGER PRIMARY KEY,
    name     TEXT NOT NULL,
    width    INTEGER NOT NULL,
    height   INTEGER NOT NULL,
    rotation INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS display_configs (
    display_id INTEGER NOT NULL,
    name       TEXT NOT NULL,
    value      TEXT NOT NULL,
    PRIMARY KEY (display_id, name)
);
CREATE TABLE IF NOT EXISTS rendered_images (
    display_id   INTEGER PRIMARY KEY,
    data         BLOB NOT NULL,
    generated_at INTEGER NOT NULL
);
";

impl SqliteDisplayStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .context("Failed to open display database")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on display database")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create display schema")?;

        // The default display must always exist so config fallback has
        // somewhere to land.
        conn.execute(
            "INSERT OR IGNORE INTO displays (id, name, width, height, rotation)
             VALUES (?1, 'default', 0, 0, 0)",
            params![DEFAULT_DISPLAY_ID],
        )?;

        let count: usize =
            conn.query_row("SELECT COUNT(*) FROM displays WHERE id != 0", [], |r| {
                r.get(0)
            })?;
        info!("Display store ready: {} displays", count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn config_value(
        conn: &Connection,
        display_id: i64,
        name: &str,
    ) -> Result<Option<String>> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM display_configs WHERE display_id = ?1 AND name = ?2",
                params![display_id, name],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

fn row_to_display(row: &rusqlite::Row<'_>) -> rusqlite::Result<Display> {
    Ok(Display {
        id: row.get(0)?,
        name: row.get(1)?,
        width: row.get(2)?,
        height: row.get(3)?,
        rotation: row.get(4)?,
    })
}

impl DisplayStore for SqliteDisplayStore {
    fn list_displays(&self) -> Result<Vec<Display>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, width, height, rotation FROM displays ORDER BY id")?;
        let displays = stmt
            .query_map([], row_to_display)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(displays)
    }

    fn get_display(&self, display_id: i64) -> Result<Option<Display>> {
        let conn = self.conn.lock().unwrap();
        let display = conn
            .query_row(
                "SELECT id, name, width, height, rotation FROM displays WHERE id = ?1",
                params![display_id],
                row_to_display,
            )
            .optional()?;
        Ok(display)
    }

    fn upsert_display(&self, display: &Display) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO displays (id, name, width, height, rotation)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 width = excluded.width,
                 height = excluded.height,
                 rotation = excluded.rotation",
            params![
                display.id,
                display.name,
                display.width,
                display.height,
                display.rotation
            ],
        )?;
        Ok(())
    }

    fn get_string(&self, display_id: i64, name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();

        // 1. per-display value (empty string means "unset")
        if let Some(value) = Self::config_value(&conn, display_id, name)? {
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }

        // 2. default display value
        if display_id != DEFAULT_DISPLAY_ID {
            if let Some(value) = Self::config_value(&conn, DEFAULT_DISPLAY_ID, name)? {
                if !value.is_empty() {
                    return Ok(Some(value));
                }
            }
        }

        Ok(None)
    }

    fn set_string(&self, display_id: i64, name: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO display_configs (display_id, name, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(display_id, name) DO UPDATE SET value = excluded.value",
            params![display_id, name, value],
        )?;
        Ok(())
    }

    fn store_rendered_image(&self, display_id: i64, png: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rendered_images (display_id, data, generated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(display_id) DO UPDATE SET
                 data = excluded.data,
                 generated_at = excluded.generated_at",
            params![display_id, png, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn rendered_image(&self, display_id: i64) -> Result<Option<(Vec<u8>, DateTime<Utc>)>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT data, generated_at FROM rendered_images WHERE display_id = ?1",
                params![display_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(data, ts)| {
            let generated_at = DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now);
            (data, generated_at)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, SqliteDisplayStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteDisplayStore::new(dir.path().join("portal.db")).unwrap();
        (dir, store)
    }

    fn seed_display(store: &SqliteDisplayStore, id: i64) {
        store
            .upsert_display(&Display {
                id,
                name: format!("display-{}", id),
                width: 800,
                height: 480,
                rotation: 0,
            })
            .unwrap();
    }

    #[test]
    fn test_default_display_always_exists() {
        let (_dir, store) = make_store();
        let displays = store.list_displays().unwrap();
        assert_eq!(displays.len(), 1);
        assert!(displays[0].is_default());
    }

    #[test]
    fn test_config_fallback_to_default_display() {
        let (_dir, store) = make_store();
        seed_display(&store, 5);

        store.set_string(0, "wakeup_schedule", "0 * * * *").unwrap();
        assert_eq!(
            store.get_string(5, "wakeup_schedule").unwrap(),
            Some("0 * * * *".to_string())
        );

        // Per-display value wins over the default.
        store.set_string(5, "wakeup_schedule", "30 * * * *").unwrap();
        assert_eq!(
            store.get_string(5, "wakeup_schedule").unwrap(),
            Some("30 * * * *".to_string())
        );
    }

    #[test]
    fn test_empty_string_counts_as_unset() {
        let (_dir, store) = make_store();
        seed_display(&store, 5);

        store.set_string(0, "telegram_chat_id", "12345").unwrap();
        store.set_string(5, "telegram_chat_id", "").unwrap();

        // The cleared per-display value falls through to the default.
        assert_eq!(
            store.get_string(5, "telegram_chat_id").unwrap(),
            Some("12345".to_string())
        );
    }

    #[test]
    fn test_get_bool_parsing() {
        let (_dir, store) = make_store();
        seed_display(&store, 5);

        assert!(!store.get_bool(5, "telegram").unwrap());
        store.set_string(5, "telegram", "1").unwrap();
        assert!(store.get_bool(5, "telegram").unwrap());
        store.set_string(5, "telegram", "True").unwrap();
        assert!(store.get_bool(5, "telegram").unwrap());
        store.set_string(5, "telegram", "0").unwrap();
        assert!(!store.get_bool(5, "telegram").unwrap());
    }

    #[test]
    fn test_get_int_rejects_garbage() {
        let (_dir, store) = make_store();
        seed_display(&store, 5);

        store.set_string(5, "alive_check_safety_lag_minutes", "10").unwrap();
        assert_eq!(
            store.get_int(5, "alive_check_safety_lag_minutes").unwrap(),
            Some(10)
        );

        store.set_string(5, "alive_check_safety_lag_minutes", "soon").unwrap();
        assert_eq!(
            store.get_int(5, "alive_check_safety_lag_minutes").unwrap(),
            None
        );
    }

    #[test]
    fn test_missed_connects_counter() {
        let (_dir, store) = make_store();
        seed_display(&store, 5);

        assert_eq!(store.missed_connects(5).unwrap(), 0);
        assert_eq!(store.increase_missed_connects(5, Utc::now()).unwrap(), 1);
        assert_eq!(store.increase_missed_connects(5, Utc::now()).unwrap(), 2);
        assert_eq!(store.missed_connects(5).unwrap(), 2);

        store.reset_missed_connects(5).unwrap();
        assert_eq!(store.missed_connects(5).unwrap(), 0);
    }

    #[test]
    fn test_last_visit_roundtrip() {
        let (_dir, store) = make_store();
        seed_display(&store, 5);

        assert_eq!(store.last_visit(5).unwrap(), None);

        let visit = Utc::now();
        store
            .set_string(5, config_keys::LAST_VISIT, &visit.to_rfc3339())
            .unwrap();
        let stored = store.last_visit(5).unwrap().unwrap();
        assert_eq!(stored.timestamp(), visit.timestamp());

        store.set_string(5, config_keys::LAST_VISIT, "yesterday").unwrap();
        assert_eq!(store.last_visit(5).unwrap(), None);
    }

    #[test]
    fn test_rendered_image_roundtrip() {
        let (_dir, store) = make_store();
        seed_display(&store, 5);

        assert!(store.rendered_image(5).unwrap().is_none());

        store.store_rendered_image(5, b"png-bytes-v1").unwrap();
        let (data, _) = store.rendered_image(5).unwrap().unwrap();
        assert_eq!(data, b"png-bytes-v1");

        // Overwrites in place.
        store.store_rendered_image(5, b"png-bytes-v2").unwrap();
        let (data, _) = store.rendered_image(5).unwrap().unwrap();
        assert_eq!(data, b"png-bytes-v2");
    }
}
