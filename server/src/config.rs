//! Instance directory and config-profile resolution. `MANGA_ENV`
//! (development/testing/production) selects the profile; the instance
//! directory is the sole runtime state location, holding the catalog
//! database, the cover cache, and backups.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Testing,
    Production,
}

impl Profile {
    pub fn from_env() -> Self {
        match std::env::var("MANGA_ENV").as_deref() {
            Ok("testing") => Profile::Testing,
            Ok("production") => Profile::Production,
            _ => Profile::Development,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Testing => "testing",
            Profile::Production => "production",
        }
    }
}

/// Runtime paths derived from a single instance directory.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub profile: Profile,
    pub instance_dir: PathBuf,
}

impl InstanceConfig {
    pub fn new(instance_dir: PathBuf) -> Self {
        Self { profile: Profile::from_env(), instance_dir }
    }

    /// Resolve the default instance directory: `$MANGA_HOME`, else a
    /// platform data directory, else `./manga-data`.
    pub fn resolve_default() -> PathBuf {
        if let Ok(dir) = std::env::var("MANGA_HOME") {
            return PathBuf::from(dir);
        }
        dirs::data_dir().map(|d| d.join("manga-server")).unwrap_or_else(|| PathBuf::from("manga-data"))
    }

    pub fn db_path(&self) -> PathBuf {
        let suffix = match self.profile {
            Profile::Production => "",
            Profile::Development => "_dev",
            Profile::Testing => "_test",
        };
        self.instance_dir.join(format!("manga_manager{suffix}.db"))
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.instance_dir.join("covers")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.instance_dir.join("backups")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.instance_dir)?;
        std::fs::create_dir_all(self.covers_dir())?;
        std::fs::create_dir_all(self.backups_dir())?;
        Ok(())
    }
}

/// Validate a backup filename against the traversal-safe naming
/// contract: `manga_manager_backup_*.db`, no path separators.
pub fn is_valid_backup_filename(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return false;
    }
    name.starts_with("manga_manager_backup_") && name.ends_with(".db")
}

pub fn backup_filename(now_unix: i64) -> String {
    let dt = chrono::DateTime::from_timestamp(now_unix, 0).unwrap_or_default();
    format!("manga_manager_backup_{}.db", dt.format("%Y-%m-%d_%H-%M-%S"))
}

/// Join a backup filename onto the backups directory after validating
/// it, rejecting anything that isn't a bare filename matching the
/// expected pattern.
pub fn resolve_backup_path(backups_dir: &Path, filename: &str) -> Option<PathBuf> {
    if !is_valid_backup_filename(filename) {
        return None;
    }
    Some(backups_dir.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_in_backup_filename() {
        assert!(!is_valid_backup_filename("../manga_manager_backup_x.db"));
        assert!(!is_valid_backup_filename("manga_manager_backup_x.db/../x"));
        assert!(is_valid_backup_filename("manga_manager_backup_2026-01-01_00-00-00.db"));
    }

    #[test]
    fn resolve_backup_path_rejects_invalid_names() {
        let dir = Path::new("/instance/backups");
        assert!(resolve_backup_path(dir, "evil.db").is_none());
        assert!(resolve_backup_path(dir, "manga_manager_backup_x.db").is_some());
    }
}
