//! Shared application state threaded through every axum handler.

use std::path::PathBuf;
use std::sync::Arc;

use manga_archive::ArchiveReader;
use manga_core::settings::Settings;
use parking_lot::RwLock;

use crate::config::InstanceConfig;
use crate::db::Catalog;
use crate::tasks::TaskEngine;

#[derive(Clone)]
pub struct AppState {
    pub db: Catalog,
    pub archive: Arc<ArchiveReader>,
    pub tasks: TaskEngine,
    pub settings: Arc<RwLock<Settings>>,
    pub config: Arc<InstanceConfig>,
}

impl AppState {
    pub fn new(db: Catalog, config: InstanceConfig) -> Result<Self, crate::error::AppError> {
        let overrides = db.load_settings_overrides()?;
        let settings = Settings::from_overrides(overrides);
        let archive = Arc::new(ArchiveReader::new());
        let tasks = TaskEngine::new(db.clone());

        Ok(Self { db, archive, tasks, settings: Arc::new(RwLock::new(settings)), config: Arc::new(config) })
    }

    pub fn settings_snapshot(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.config.covers_dir()
    }
}
