pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod payload;
pub mod repository;
pub mod signature;
pub mod transport;

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::NotifierConfig;
use crate::dispatcher::WebhookDispatcher;
use crate::repository::RepositoryServiceFactory;
use crate::transport::HttpTransport;

pub struct AppState {
    pub config: RwLock<NotifierConfig>,
    pub config_path: PathBuf,
    pub dispatcher: WebhookDispatcher,
    pub repository_services: Arc<dyn RepositoryServiceFactory>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: NotifierConfig,
        config_path: PathBuf,
        transport: Arc<dyn HttpTransport>,
        repository_services: Arc<dyn RepositoryServiceFactory>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            config_path,
            dispatcher: WebhookDispatcher::new(transport),
            repository_services,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
