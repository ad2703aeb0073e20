use super::{ShortCodeStrategy, UniquenessCheck, BASE62_ALPHABET};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use rand::Rng;

/// Draws `length` characters uniformly from the Base62 alphabet and retries
/// on collision against the authoritative store, up to `max_retries` times.
pub struct RandomStrategy {
    length: usize,
    max_retries: u32,
}

impl RandomStrategy {
    pub fn new(length: usize, max_retries: u32) -> Self {
        Self {
            length,
            max_retries,
        }
    }

    fn random_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| {
                let idx = rng.gen_range(0..BASE62_ALPHABET.len());
                BASE62_ALPHABET[idx] as char
            })
            .collect()
    }
}

#[async_trait]
impl ShortCodeStrategy for RandomStrategy {
    async fn generate(&self, _id: i64, ctx: &(dyn UniquenessCheck + Send + Sync)) -> CoreResult<String> {
        for _ in 0..self.max_retries {
            let code = self.random_code();
            if !ctx.code_exists(&code).await? {
                return Ok(code);
            }
        }
        Err(CoreError::Exhausted {
            attempts: self.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct AlwaysExists;
    #[async_trait]
    impl UniquenessCheck for AlwaysExists {
        async fn code_exists(&self, _code: &str) -> CoreResult<bool> {
            Ok(true)
        }
    }

    struct NeverExists;
    #[async_trait]
    impl UniquenessCheck for NeverExists {
        async fn code_exists(&self, _code: &str) -> CoreResult<bool> {
            Ok(false)
        }
    }

    struct ExistsThenFree {
        calls: Arc<AtomicUsize>,
        free_after: usize,
    }
    #[async_trait]
    impl UniquenessCheck for ExistsThenFree {
        async fn code_exists(&self, _code: &str) -> CoreResult<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(n < self.free_after)
        }
    }

    #[tokio::test]
    async fn exhausted_after_max_retries() {
        let strategy = RandomStrategy::new(5, 5);
        let err = strategy.generate(1, &AlwaysExists).await.unwrap_err();
        assert!(matches!(err, CoreError::Exhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn succeeds_when_slot_is_free() {
        let strategy = RandomStrategy::new(5, 5);
        let code = strategy.generate(1, &NeverExists).await.unwrap();
        assert_eq!(code.len(), 5);
        assert!(code.chars().all(|c| BASE62_ALPHABET.contains(&(c as u8))));
    }

    #[tokio::test]
    async fn retries_until_a_free_slot_is_found() {
        let strategy = RandomStrategy::new(5, 5);
        let ctx = ExistsThenFree {
            calls: Arc::new(AtomicUsize::new(0)),
            free_after: 3,
        };
        let code = strategy.generate(1, &ctx).await.unwrap();
        assert_eq!(code.len(), 5);
    }
}
