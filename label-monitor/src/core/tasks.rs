//! 事件订阅任务
//!
//! 自动打印和事件日志都作为总线订阅者运行在各自的任务里，
//! 共用一个取消令牌，随监控会话一起关闭。

use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// How long subscribers get to drain after cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Subscriber tasks of one monitoring run
pub struct SubscriberTasks {
    set: JoinSet<&'static str>,
    shutdown: CancellationToken,
}

impl SubscriberTasks {
    pub fn new() -> Self {
        Self {
            set: JoinSet::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token the subscriber loops select on
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start a subscriber; `name` is only used for logging
    pub fn spawn<F>(&mut self, name: &'static str, subscriber: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.set.spawn(async move {
            subscriber.await;
            name
        });
        tracing::debug!(subscriber = name, "Subscriber started");
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Reap subscribers that ended before shutdown; returns how many did
    pub fn reap_finished(&mut self) -> usize {
        let mut ended = 0;
        while let Some(result) = self.set.try_join_next() {
            ended += 1;
            match result {
                Ok(name) => tracing::warn!(subscriber = name, "Subscriber ended before shutdown"),
                Err(e) => log_join_error(e),
            }
        }
        ended
    }

    /// Cancel every subscriber and wait for them, aborting stragglers
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(result) = self.set.join_next().await {
                match result {
                    Ok(name) => tracing::debug!(subscriber = name, "Subscriber stopped"),
                    Err(e) => log_join_error(e),
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = self.set.len(), "Subscribers did not stop in time, aborting");
            self.set.shutdown().await;
        }
    }
}

impl Default for SubscriberTasks {
    fn default() -> Self {
        Self::new()
    }
}

fn log_join_error(err: JoinError) {
    if err.is_cancelled() {
        return;
    }
    match err.try_into_panic() {
        Ok(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic = %msg, "Subscriber panicked");
        }
        Err(e) => tracing::error!(error = %e, "Subscriber failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_subscribers() {
        let mut tasks = SubscriberTasks::new();
        let token = tasks.shutdown_token();
        tasks.spawn("waiter", async move { token.cancelled().await });
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.reap_finished(), 0);

        tokio::time::timeout(Duration::from_secs(1), tasks.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_reaped() {
        let mut tasks = SubscriberTasks::new();
        tasks.spawn("boom", async { panic!("boom") });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tasks.reap_finished(), 1);
        assert!(tasks.is_empty());
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_subscriber_is_aborted() {
        let mut tasks = SubscriberTasks::new();
        tasks.spawn("stuck", std::future::pending());
        tasks.shutdown().await;
    }
}
