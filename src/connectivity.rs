//! Connectivity monitor.
//!
//! One observable boolean owned by one component. Platform online/offline
//! transition events feed [`ConnectivityMonitor::set_online`]; everything
//! else reads the signal through a watch subscription so independent polls
//! cannot drift out of sync.

use tokio::sync::watch;
use tracing::{debug, info};

/// Process-wide online/offline signal.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create the monitor with the platform's initial state.
    pub fn new(initial_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initial_online);
        Self { tx }
    }

    /// Current value of the signal.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Feed a platform transition event. Only actual changes propagate to
    /// subscribers; repeated notifications of the same state are dropped.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        } else {
            debug!(online, "Connectivity event without state change");
        }
    }

    /// Subscribe to signal transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Manual probe: confirm connectivity with a HEAD request and update the
    /// signal from the result.
    pub async fn probe(&self, client: &reqwest::Client, url: &str) -> bool {
        let reachable = client
            .head(url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        self.set_online(reachable);
        reachable
    }
}
