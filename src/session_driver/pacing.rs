//! Human-pacing delay between remote requests
//!
//! The delay has no functional meaning. `NoDelay` is used in tests and when
//! pacing is disabled in config.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Delay strategy injected into the driver
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Uniformly random delay within `[min, max]`
#[derive(Debug, Clone)]
pub struct RandomPacer {
    min: Duration,
    max: Duration,
}

impl RandomPacer {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }
}

#[async_trait]
impl Pacer for RandomPacer {
    async fn pause(&self) {
        let delay = self.next_delay();
        tracing::trace!(delay_ms = delay.as_millis() as u64, "Pacing delay");
        tokio::time::sleep(delay).await;
    }
}

/// Zero wait
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Pacer for NoDelay {
    async fn pause(&self) {}
}
