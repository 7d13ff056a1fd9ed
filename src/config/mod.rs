//! Client configuration: batching, pull, retry, and connection options.

use crate::error::Result;
use crate::executor::Executor;
use std::time::Duration;

/// Default service endpoint.
pub const DEFAULT_ENDPOINT: &str = "pubsub.googleapis.com";

/// Controls how the publisher groups messages into batches.
///
/// A batch is flushed as soon as it reaches `maximum_message_count`
/// messages or `maximum_batch_bytes` bytes, and no later than
/// `maximum_hold_time` after its first message arrived.
#[derive(Debug, Clone)]
pub struct BatchingConfig {
    /// Flush when the pending batch reaches this many messages. Minimum 1.
    pub maximum_message_count: usize,
    /// Flush when the pending batch reaches this many bytes. Also the upper
    /// bound on a single message; larger messages are rejected, never split.
    pub maximum_batch_bytes: usize,
    /// Flush no later than this after the first message of a batch arrived.
    /// Zero flushes on the next executor turn.
    pub maximum_hold_time: Duration,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            maximum_message_count: 100,
            maximum_batch_bytes: 1024 * 1024,
            maximum_hold_time: Duration::from_millis(10),
        }
    }
}

impl BatchingConfig {
    /// Clamp fields to their documented minimums.
    pub fn normalized(mut self) -> Self {
        self.maximum_message_count = self.maximum_message_count.max(1);
        self
    }
}

/// Retry policy for transient pull failures.
///
/// Backoff is exponential: `min_backoff * 2^attempt`, capped at
/// `max_backoff`. Permanent failures are never retried; after
/// `max_attempts` consecutive transient failures the session terminates
/// with the last status.
#[derive(Debug, Clone)]
pub struct PullRetryConfig {
    /// Consecutive transient failures tolerated before giving up.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub min_backoff: Duration,
    /// Upper bound on the backoff delay.
    pub max_backoff: Duration,
}

impl Default for PullRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl PullRetryConfig {
    /// The backoff delay before retry number `attempt` (0-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt);
        self.min_backoff.saturating_mul(exp).min(self.max_backoff)
    }
}

/// Controls the subscriber's pull loop.
#[derive(Debug, Clone)]
pub struct PullOptions {
    /// Maximum messages requested per pull.
    pub max_messages: i32,
    /// Retry policy for transient pull failures.
    pub retry: PullRetryConfig,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            max_messages: 100,
            retry: PullRetryConfig::default(),
        }
    }
}

/// Connection-level options shared by all clients.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Service endpoint. The `PUBSUB_EMULATOR_HOST` environment variable
    /// overrides it (and disables credentials) at stub construction.
    pub endpoint: String,
    /// Bearer token attached to requests, if any.
    pub credentials: Option<String>,
    /// Extra product tokens prepended to the user-agent string.
    pub user_agent_prefix: Vec<String>,
    /// Worker threads for the library-owned executor.
    pub background_threads: usize,
    /// Caller-supplied executor; set to disable automatic background
    /// threads.
    pub executor: Option<Executor>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: None,
            user_agent_prefix: Vec::new(),
            background_threads: num_cpus::get().max(1),
            executor: None,
        }
    }
}

impl ConnectionOptions {
    /// The full user-agent string: prefix pieces followed by the library
    /// product token and platform fragment.
    pub fn user_agent(&self) -> String {
        let mut pieces = self.user_agent_prefix.clone();
        pieces.push(format!(
            "cloudq/{} ({}; {})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        pieces.join(" ")
    }

    /// The executor to run pipelines on: the caller-supplied one, or a new
    /// library-owned pool with [`background_threads`] workers.
    ///
    /// [`background_threads`]: ConnectionOptions::background_threads
    pub fn build_executor(&self) -> Result<Executor> {
        match &self.executor {
            Some(executor) => Ok(executor.clone()),
            None => Executor::new(self.background_threads),
        }
    }
}

/// Options for constructing a publisher.
#[derive(Debug, Clone, Default)]
pub struct PublisherOptions {
    /// Batching policy for the publish pipeline.
    pub batching: BatchingConfig,
    /// Connection-level options.
    pub connection: ConnectionOptions,
}

/// Options for constructing a subscriber.
#[derive(Debug, Clone, Default)]
pub struct SubscriberOptions {
    /// Pull loop options.
    pub pull: PullOptions,
    /// Connection-level options.
    pub connection: ConnectionOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batching_defaults() {
        let config = BatchingConfig::default();
        assert_eq!(config.maximum_message_count, 100);
        assert_eq!(config.maximum_batch_bytes, 1024 * 1024);
        assert_eq!(config.maximum_hold_time, Duration::from_millis(10));
    }

    #[test]
    fn test_batching_normalized_clamps_count() {
        let config = BatchingConfig {
            maximum_message_count: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.maximum_message_count, 1);
    }

    #[test]
    fn test_retry_backoff_is_exponential_and_capped() {
        let retry = PullRetryConfig {
            max_attempts: 10,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        };
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(2), Duration::from_millis(400));
        // 100ms * 2^7 = 12.8s, capped at 1s.
        assert_eq!(retry.backoff(7), Duration::from_secs(1));
    }

    #[test]
    fn test_default_endpoint() {
        let options = ConnectionOptions::default();
        assert_eq!(options.endpoint, DEFAULT_ENDPOINT);
        assert!(options.credentials.is_none());
        assert!(options.background_threads >= 1);
    }

    #[test]
    fn test_user_agent_includes_prefix_and_version() {
        let options = ConnectionOptions {
            user_agent_prefix: vec!["my-app/2.0".to_string()],
            ..Default::default()
        };
        let user_agent = options.user_agent();
        assert!(user_agent.starts_with("my-app/2.0 cloudq/"));
        assert!(user_agent.contains(env!("CARGO_PKG_VERSION")));
    }
}
