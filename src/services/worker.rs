use crate::services::rate_limiter::UploadRateLimiter;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically drops expired rate-limit windows so the key map stays bounded.
pub struct BackgroundWorker {
    rate_limiter: Arc<UploadRateLimiter>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        rate_limiter: Arc<UploadRateLimiter>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            rate_limiter,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup();
                }
            }
        }
    }

    fn perform_cleanup(&self) {
        let removed = self.rate_limiter.sweep_expired();
        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.rate_limiter.tracked_clients(),
                "Swept expired rate limit windows"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_worker_sweeps_and_stops() {
        let limiter = Arc::new(UploadRateLimiter::new(5, Duration::from_millis(50)));
        limiter.check("client").unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(
            BackgroundWorker::new(limiter.clone(), Duration::from_millis(100), rx).run(),
        );

        sleep(Duration::from_millis(400)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
