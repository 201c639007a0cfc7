//! Runtime configuration types shared with the server crate.
//!
//! Parsing and validation of the config file happen in the server; these are
//! the already-validated values.

use std::time::Duration;

pub const DEFAULT_MAX_TRIES: i32 = 5;
/// Largest accepted `max_tries`. Past this the retry delay stays at its cap
/// for months.
pub const MAX_TRIES_LIMIT: i32 = 32;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Settings of the webhook delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookQueueConfig {
    /// Failed attempts after which an entry is dropped. Between 1 and
    /// [`MAX_TRIES_LIMIT`].
    pub max_tries: i32,
    pub poll_interval: Duration,
    /// Timeout of one outbound HTTP request.
    pub request_timeout: Duration,
    /// Maximum number of due entries loaded per tick.
    pub batch_size: i64,
}

impl Default for WebhookQueueConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}
