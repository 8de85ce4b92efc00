//! Periodic lookup of the sensor's public address.
//!
//! Sensors behind NAT report their external address in published events.
//! [`OwnIpResolver`] polls a "what is my IP" URL that answers with the bare
//! address as text and keeps the last answer.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Default time between lookups.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Default delay before the first lookup.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Background task holding the most recently resolved address.
///
/// The task stops when the resolver is dropped.
pub struct OwnIpResolver {
    current: watch::Receiver<Option<String>>,
    task: JoinHandle<()>,
}

impl OwnIpResolver {
    /// Start polling `url` every `interval`, the first time after `initial_delay`.
    pub fn spawn(url: impl Into<String>, interval: Duration, initial_delay: Duration) -> Self {
        let url = url.into();
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(poll(url, interval, initial_delay, tx));
        Self { current: rx, task }
    }

    /// Start polling with the default schedule.
    pub fn spawn_default(url: impl Into<String>) -> Self {
        Self::spawn(url, DEFAULT_INTERVAL, DEFAULT_INITIAL_DELAY)
    }

    /// Last address obtained, if any lookup succeeded yet.
    pub fn current(&self) -> Option<String> {
        self.current.borrow().clone()
    }
}

impl Drop for OwnIpResolver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll(
    url: String,
    interval: Duration,
    initial_delay: Duration,
    current: watch::Sender<Option<String>>,
) {
    let client = reqwest::Client::new();
    let start = tokio::time::Instant::now() + initial_delay;
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match resolve(&client, &url).await {
            Ok(address) if !address.is_empty() => {
                tracing::debug!(%address, "own ip resolved");
                current.send_replace(Some(address));
            }
            Ok(_) => tracing::warn!(%url, "own ip lookup returned an empty body"),
            Err(e) => tracing::warn!(%url, "own ip lookup failed: {}", e),
        }
    }
}

async fn resolve(client: &reqwest::Client, url: &str) -> Result<String> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body.trim().to_string())
}
