//! Persistence for the settings provider's overrides. The typed
//! schema, bounds, and defaults live in `manga_core::settings`; this
//! module only reads/writes the raw key/value rows backing it.

use std::collections::HashMap;

use rusqlite::params;

use super::Catalog;
use crate::error::AppError;

impl Catalog {
    pub fn load_settings_overrides(&self) -> Result<HashMap<String, String>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
            rows.collect()
        })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
        })?;
        Ok(())
    }

    pub fn reset_setting(&self, key: &str) -> Result<(), AppError> {
        self.with_conn(|conn| conn.execute("DELETE FROM settings WHERE key = ?1", params![key]))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_reset_roundtrips() {
        let db = Catalog::open_in_memory().unwrap();
        db.set_setting("scan.max_workers", "32").unwrap();
        let overrides = db.load_settings_overrides().unwrap();
        assert_eq!(overrides.get("scan.max_workers"), Some(&"32".to_string()));

        db.reset_setting("scan.max_workers").unwrap();
        let overrides = db.load_settings_overrides().unwrap();
        assert!(!overrides.contains_key("scan.max_workers"));
    }
}
