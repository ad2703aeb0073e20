mod base62;
mod random;

pub use base62::Base62Strategy;
pub use random::RandomStrategy;

use crate::error::CoreResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Bit-exact Base62 alphabet: digits, then lowercase, then uppercase.
pub const BASE62_ALPHABET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode `n` in the Base62 alphabet, big-endian positional. `0` encodes as `"0"`.
pub fn base62_encode(mut n: i64) -> String {
    if n == 0 {
        return (BASE62_ALPHABET[0] as char).to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        let digit = (n % 62) as usize;
        out.push(BASE62_ALPHABET[digit]);
        n /= 62;
    }
    out.reverse();
    String::from_utf8(out).expect("base62 alphabet is ASCII")
}

/// Capability C1 needs to check for collisions; satisfied by `UrlStore::code_exists`.
#[async_trait]
pub trait UniquenessCheck: Send + Sync {
    async fn code_exists(&self, code: &str) -> CoreResult<bool>;
}

/// Produces a short code for a freshly minted URL id.
///
/// Implementations are process-wide and stateless beyond their configuration,
/// constructed once at startup and shared behind an `Arc`.
#[async_trait]
pub trait ShortCodeStrategy: Send + Sync {
    async fn generate(&self, id: i64, ctx: &(dyn UniquenessCheck + Send + Sync)) -> CoreResult<String>;
}

#[derive(Debug, Clone)]
pub struct ShortCodeConfig {
    pub strategy: ShortCodeKind,
    pub length: usize,
    pub salt: i64,
    pub max_retries: u32,
}

impl Default for ShortCodeConfig {
    fn default() -> Self {
        Self {
            strategy: ShortCodeKind::Base62,
            length: 5,
            salt: 0,
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCodeKind {
    Base62,
    Random,
}

/// Construct the configured strategy instance.
pub fn build_strategy(config: &ShortCodeConfig) -> Arc<dyn ShortCodeStrategy> {
    match config.strategy {
        ShortCodeKind::Base62 => Arc::new(Base62Strategy::new(config.salt, config.length)),
        ShortCodeKind::Random => Arc::new(RandomStrategy::new(config.length, config.max_retries)),
    }
}
