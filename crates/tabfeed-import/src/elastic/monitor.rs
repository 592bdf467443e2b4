//! Cluster liveness monitor
//!
//! A fixed-interval poll of the cluster root, independent of any running
//! import, alive for the lifetime of the process. The monitor is the only
//! writer of connectivity state; everyone else reads snapshots through the
//! watch channel, so the front end can gate imports on reachability without
//! touching the poll loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::ElasticClient;

/// Fixed delay between liveness polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Snapshot of cluster connectivity as of the latest poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    /// The cluster answered the latest poll.
    pub reachable: bool,

    /// Version number reported by the cluster root, when reachable.
    pub version: Option<String>,
}

/// Handle to the background poll loop.
pub struct ClusterMonitor {
    receiver: watch::Receiver<Option<ClusterStatus>>,
    handle: JoinHandle<()>,
}

impl ClusterMonitor {
    /// Spawn the poll loop at the default interval.
    pub fn spawn(client: ElasticClient) -> Self {
        Self::spawn_with_interval(client, POLL_INTERVAL)
    }

    /// Spawn the poll loop with an explicit interval (tests shrink it).
    pub fn spawn_with_interval(client: ElasticClient, interval: Duration) -> Self {
        let (sender, receiver) = watch::channel(None);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut previous: Option<ClusterStatus> = None;

            loop {
                ticker.tick().await;

                let status = match client.ping().await {
                    Ok(version) => ClusterStatus {
                        reachable: true,
                        version: Some(version),
                    },
                    Err(_) => ClusterStatus {
                        reachable: false,
                        version: None,
                    },
                };

                match (&previous, &status) {
                    (Some(before), now) if before.reachable != now.reachable => {
                        if now.reachable {
                            info!(version = ?now.version, "elasticsearch is reachable again");
                        } else {
                            warn!("lost connection to elasticsearch");
                        }
                    },
                    (None, now) => {
                        if now.reachable {
                            info!(version = ?now.version, "connected to elasticsearch");
                        } else {
                            warn!("elasticsearch is unreachable");
                        }
                    },
                    _ => {},
                }
                previous = Some(status.clone());

                if sender.send(Some(status)).is_err() {
                    // nobody is listening anymore.
                    return;
                }
            }
        });

        Self { receiver, handle }
    }

    /// Latest snapshot; `None` until the first poll completes.
    pub fn status(&self) -> Option<ClusterStatus> {
        self.receiver.borrow().clone()
    }

    /// A receiver for callers that want to await status transitions.
    pub fn subscribe(&self) -> watch::Receiver<Option<ClusterStatus>> {
        self.receiver.clone()
    }

    /// Wait for the first completed poll and return its snapshot.
    pub async fn first_status(&self) -> Option<ClusterStatus> {
        let mut receiver = self.receiver.clone();
        let polled = receiver.wait_for(|status| status.is_some()).await.ok()?;
        polled.clone()
    }

    /// Stop polling. The monitor normally runs until process exit; tests and
    /// one-shot commands shut it down explicitly.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ClusterMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
