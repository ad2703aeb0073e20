use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authoritative record for a shortened URL.
///
/// `short_code` is `None` only during the brief two-phase creation window
/// between placeholder insert and code assignment (see `UrlStore::create_placeholder`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: i64,
    pub long_url: String,
    pub short_code: Option<String>,
    pub total_hits: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only analytics event published on every successful redirect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub short_code: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub country: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
}

impl HitEvent {
    pub fn new(short_code: impl Into<String>) -> Self {
        Self {
            short_code: short_code.into(),
            timestamp: Utc::now(),
            ip_address: None,
            user_agent: None,
            referer: None,
            country: None,
            device_type: None,
            browser: None,
        }
    }
}

/// Metadata lifted from the inbound request when a redirect fires a hit event.
/// Geolocation/user-agent parsing is out of scope — fields are carried as-is.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub country: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
}

/// Opaque envelope handed back by a queue's `consume`, carrying the
/// backend-assigned id used for `ack`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub message_id: String,
    pub event: HitEvent,
}
