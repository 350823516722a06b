//! Outbound write backpressure.
//!
//! The writer task reports how many bytes are queued but not yet flushed.
//! Once that exceeds the high watermark the channel is unwritable until it
//! drains back to the low watermark. [`WriteThrottle::acquire`] waits for
//! writability and fails with [`BoltError::ThrottleTimeout`] when the peer
//! has not drained for longer than the configured maximum.
//!
//! `acquire` is the only intentional wait in the connection core. It is
//! awaited by the worker loop between responses, never from inside state
//! machine dispatch.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{BoltError, BoltResult};

/// Default low watermark (32KB)
pub const DEFAULT_LOW_WATERMARK: usize = 32 * 1024;
/// Default high watermark (64KB)
pub const DEFAULT_HIGH_WATERMARK: usize = 64 * 1024;
/// Default maximum time a writer may stay blocked
pub const DEFAULT_MAX_LOCK_DURATION: Duration = Duration::from_secs(15 * 60);
/// Default interval between writability checks while blocked
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Watermarks and time limits for write backpressure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Buffered bytes at or below which writing resumes
    pub low_watermark: usize,
    /// Buffered bytes above which writing blocks
    pub high_watermark: usize,
    /// Longest a single `acquire` may wait
    #[serde(with = "duration_ms")]
    pub max_lock_duration: Duration,
    /// How often a blocked `acquire` re-checks the channel
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            low_watermark: DEFAULT_LOW_WATERMARK,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            max_lock_duration: DEFAULT_MAX_LOCK_DURATION,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ThrottleConfig {
    pub fn new(low_watermark: usize, high_watermark: usize, max_lock_duration: Duration) -> Self {
        Self {
            low_watermark,
            high_watermark,
            max_lock_duration,
            ..Default::default()
        }
    }

    /// Set the re-check interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> BoltResult<()> {
        if self.high_watermark == 0 {
            return Err(BoltError::configuration("throttle high_watermark must be > 0"));
        }
        if self.low_watermark > self.high_watermark {
            return Err(BoltError::configuration(format!(
                "throttle low_watermark ({}) exceeds high_watermark ({})",
                self.low_watermark, self.high_watermark
            )));
        }
        if self.max_lock_duration.is_zero() || self.poll_interval.is_zero() {
            return Err(BoltError::configuration("throttle durations must be non-zero"));
        }
        Ok(())
    }
}

/// Durations as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Default)]
struct Gauge {
    /// Bytes handed to the writer and not yet flushed
    buffered: usize,
    /// Above the high watermark and not yet back at the low one
    saturated: bool,
    /// Last acquire timed out and its grace pass is unused
    exceeded: bool,
}

/// Per-connection write throttle.
///
/// Shared between the worker (which acquires) and the writer task (which
/// reports queued and flushed bytes). Never shared across connections.
#[derive(Debug)]
pub struct WriteThrottle {
    config: Option<ThrottleConfig>,
    gauge: Mutex<Gauge>,
    /// Serializes acquirers
    lock: tokio::sync::Mutex<()>,
    writable: Notify,
}

impl WriteThrottle {
    /// Create a throttle; `None` disables it.
    pub fn new(config: Option<ThrottleConfig>) -> Self {
        Self {
            config,
            gauge: Mutex::new(Gauge::default()),
            lock: tokio::sync::Mutex::new(()),
            writable: Notify::new(),
        }
    }

    /// A no-op pass-through throttle.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Bytes queued and not yet flushed.
    pub fn buffered(&self) -> usize {
        self.gauge.lock().buffered
    }

    pub fn is_writable(&self) -> bool {
        !self.gauge.lock().saturated
    }

    /// Whether the last acquire timed out and its grace pass is unused.
    pub fn is_exceeded(&self) -> bool {
        self.gauge.lock().exceeded
    }

    /// Record bytes handed to the writer.
    pub fn queued(&self, bytes: usize) {
        let Some(config) = &self.config else { return };
        let mut gauge = self.gauge.lock();
        gauge.buffered += bytes;
        if !gauge.saturated && gauge.buffered > config.high_watermark {
            gauge.saturated = true;
            debug!(buffered = gauge.buffered, "write backpressure engaged");
        }
    }

    /// Record bytes written to the transport.
    pub fn flushed(&self, bytes: usize) {
        let Some(config) = &self.config else { return };
        let resumed = {
            let mut gauge = self.gauge.lock();
            gauge.buffered = gauge.buffered.saturating_sub(bytes);
            let resumed = gauge.saturated && gauge.buffered <= config.low_watermark;
            if resumed {
                gauge.saturated = false;
            }
            resumed
        };
        if resumed {
            self.release();
        }
    }

    /// Wake anyone blocked in [`acquire`](Self::acquire).
    pub fn release(&self) {
        self.writable.notify_waiters();
    }

    /// Wait until the channel is writable.
    ///
    /// Fails with [`BoltError::ThrottleTimeout`] once the wait exceeds
    /// `max_lock_duration` and marks the channel exceeded. The next call
    /// after such a failure passes straight through so one final FAILURE can
    /// be flushed before the connection is closed.
    pub async fn acquire(&self) -> BoltResult<()> {
        let Some(config) = &self.config else {
            return Ok(());
        };
        let _guard = self.lock.lock().await;

        {
            let mut gauge = self.gauge.lock();
            if gauge.exceeded {
                gauge.exceeded = false;
                debug!("write throttle exceeded earlier, letting one write through");
                return Ok(());
            }
            if !gauge.saturated {
                return Ok(());
            }
        }

        let start = Instant::now();
        let deadline = start + config.max_lock_duration;
        warn!(
            buffered = self.buffered(),
            high_watermark = config.high_watermark,
            "peer is not reading, write blocked"
        );

        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_writable() {
                debug!(waited = ?start.elapsed(), "write unblocked");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                self.gauge.lock().exceeded = true;
                let waited = now - start;
                warn!(?waited, max = ?config.max_lock_duration, "write throttle timed out");
                return Err(BoltError::ThrottleTimeout {
                    waited,
                    max: config.max_lock_duration,
                });
            }

            let wake = deadline.min(now + config.poll_interval);
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}

impl Default for WriteThrottle {
    fn default() -> Self {
        Self::disabled()
    }
}
