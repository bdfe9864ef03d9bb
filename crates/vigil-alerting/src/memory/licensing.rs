//! Manually driven license feed.

use crate::license::{License, LicenseSource};
use tokio::sync::watch;

/// License source whose updates are published by hand.
pub struct LicenseFeed {
    sender: watch::Sender<Option<License>>,
}

impl LicenseFeed {
    /// A feed that has not published a license yet.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn with_license(license: License) -> Self {
        let (sender, _) = watch::channel(Some(license));
        Self { sender }
    }

    pub fn publish(&self, license: License) {
        self.sender.send_replace(Some(license));
    }

    /// Live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LicenseFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseSource for LicenseFeed {
    fn subscribe(&self) -> watch::Receiver<Option<License>> {
        self.sender.subscribe()
    }
}
