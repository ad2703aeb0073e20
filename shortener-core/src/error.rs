use thiserror::Error;

/// Error kinds shared across the hot redirect path and the background worker.
///
/// Callers map these to HTTP statuses or to "log and continue" at their
/// boundary, depending on which operation raised them.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found")]
    NotFound,

    #[error("short code capacity exceeded for id {id} with salt {salt} (max length {max_length})")]
    CapacityExceeded {
        id: i64,
        salt: i64,
        max_length: usize,
    },

    #[error("random short code strategy exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("authoritative store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("cache backend unavailable: {0}")]
    CacheUnavailable(String),

    #[error("queue backend unavailable: {0}")]
    QueueUnavailable(String),

    #[error("hit storage backend failure: {0}")]
    StorageBackendFailure(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
