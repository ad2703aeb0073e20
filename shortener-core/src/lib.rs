pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod queue;
pub mod service;
pub mod shortcode;
pub mod storage;
pub mod store;
pub mod worker;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use models::{HitEvent, QueueMessage, RequestMetadata, UrlRecord};
pub use service::{UrlService, UrlStats};
pub use worker::{HitWorker, HitWorkerConfig};
