//! Change Feed - post-commit notifications
//!
//! After every successful mutation the pipeline publishes the set of
//! collections that changed. Observers (UI lists, counters) re-query what
//! they display. Publishing with nobody listening is not an error.

use std::collections::BTreeSet;

use serde::Serialize;
use tokio::sync::broadcast;

/// Observable collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Devices,
    SuspiciousDevices,
    Alerts,
    UnacknowledgedAlerts,
    Clusters,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Devices => "devices",
            Collection::SuspiciousDevices => "suspicious_devices",
            Collection::Alerts => "alerts",
            Collection::UnacknowledgedAlerts => "unacknowledged_alerts",
            Collection::Clusters => "clusters",
        }
    }
}

/// Collections touched by one committed mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    collections: BTreeSet<Collection>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collection: Collection) -> Self {
        self.collections.insert(collection);
        self
    }

    pub fn insert(&mut self, collection: Collection) {
        self.collections.insert(collection);
    }

    pub fn contains(&self, collection: Collection) -> bool {
        self.collections.contains(&collection)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Collection> + '_ {
        self.collections.iter().copied()
    }
}

pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeSet>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every change set published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        if self.sender.send(changes).is_err() {
            // no subscribers
            log::trace!("Change set dropped, nobody listening");
        }
    }
}
