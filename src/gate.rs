//! Process-wide rate-limit gate.
//!
//! Any 429 closes the gate for a fixed cool-down; every item waits for the
//! gate to be open before it starts an attempt.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

/// Open/closed signal shared by every in-flight item.
#[derive(Debug)]
pub struct RateLimitGate {
    open: watch::Sender<bool>,
    cooldown: Duration,
}

impl RateLimitGate {
    /// A gate that starts open and stays closed for `cooldown` after each hit.
    pub fn new(cooldown: Duration) -> Self {
        let (open, _) = watch::channel(true);
        Self { open, cooldown }
    }

    /// True when work may proceed
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Returns once the gate is open.
    pub async fn wait_open(&self) {
        let mut rx = self.open.subscribe();
        // The sender lives in `self`, so the channel can't close under us.
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Closes the gate, sleeps out the cool-down, then opens it again.
    ///
    /// Several items can be cooling down at once; closing a closed gate or
    /// opening an open one changes nothing.
    pub async fn cool_down(&self) {
        self.open.send_replace(false);
        warn!("Rate limit hit, pausing execution");
        tokio::time::sleep(self.cooldown).await;
        self.open.send_replace(true);
        info!("Flag cleared, resuming...");
    }

    #[cfg(test)]
    fn close(&self) {
        self.open.send_replace(false);
    }
}
