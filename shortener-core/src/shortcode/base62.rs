use super::{base62_encode, ShortCodeStrategy, UniquenessCheck};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;

/// Deterministic Base62-with-salt strategy.
///
/// `n = id + salt` encoded in Base62. Injective on the domain of ids for a
/// fixed salt, so no uniqueness check against the store is ever performed.
pub struct Base62Strategy {
    salt: i64,
    max_length: usize,
}

impl Base62Strategy {
    pub fn new(salt: i64, max_length: usize) -> Self {
        Self { salt, max_length }
    }
}

#[async_trait]
impl ShortCodeStrategy for Base62Strategy {
    async fn generate(&self, id: i64, _ctx: &(dyn UniquenessCheck + Send + Sync)) -> CoreResult<String> {
        let n = id + self.salt;
        let encoded = base62_encode(n);
        if encoded.len() > self.max_length {
            return Err(CoreError::CapacityExceeded {
                id,
                salt: self.salt,
                max_length: self.max_length,
            });
        }
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcode::base62_encode;

    struct NoopUniqueness;
    #[async_trait]
    impl UniquenessCheck for NoopUniqueness {
        async fn code_exists(&self, _code: &str) -> CoreResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn zero_encodes_as_single_zero_char() {
        assert_eq!(base62_encode(0), "0");
    }

    #[tokio::test]
    async fn scenario_s2_first_minted_code() {
        // strategy=base62, salt=1256, L=5: generate(1) -> Base62(1257).
        // Against the bit-exact alphabet "0-9a-zA-Z", 1257 = 20*62 + 17,
        // which is "kh", not the "KR" quoted in the scenario text — the
        // scenario's literal value doesn't reconcile with its own alphabet
        // table or with the original Python encoder, so this asserts the
        // value the defined alphabet actually produces.
        let strategy = Base62Strategy::new(1256, 5);
        let code = strategy.generate(1, &NoopUniqueness).await.unwrap();
        assert_eq!(code, "kh");
    }

    #[tokio::test]
    async fn scenario_s3_capacity_exceeded_boundary() {
        // 62^5 = 916_132_832 fits the numeric range, but an id this large
        // with salt=1256 still produces more than 5 characters.
        let strategy = Base62Strategy::new(1256, 5);
        let err = strategy.generate(10_000_000, &NoopUniqueness).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { .. }));

        // With salt=0 the same id fits comfortably in 5 characters.
        let strategy = Base62Strategy::new(0, 5);
        let code = strategy.generate(10_000_000, &NoopUniqueness).await.unwrap();
        assert!(code.len() <= 5);
    }

    #[tokio::test]
    async fn deterministic_for_same_id_and_salt() {
        let strategy = Base62Strategy::new(42, 8);
        let a = strategy.generate(7, &NoopUniqueness).await.unwrap();
        let b = strategy.generate(7, &NoopUniqueness).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_ids_yield_distinct_codes() {
        let strategy = Base62Strategy::new(42, 8);
        let a = strategy.generate(7, &NoopUniqueness).await.unwrap();
        let b = strategy.generate(8, &NoopUniqueness).await.unwrap();
        assert_ne!(a, b);
    }
}
