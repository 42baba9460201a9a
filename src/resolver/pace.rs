// Inter-title pacing.
//
// The engine is sequential per unique title and sleeps briefly after each
// fresh resolution to stay inside the metadata service's rate limits.
// The delay is injected so tests (and cache-only runs) never touch the
// wall clock.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// A pacer that never sleeps.
    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_pacer_returns_immediately() {
        let pacer = Pacer::disabled();
        let start = std::time::Instant::now();
        pacer.pause().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
