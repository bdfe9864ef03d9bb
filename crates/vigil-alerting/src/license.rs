//! License state.
//!
//! [`LicenseState`] subscribes to a [`LicenseSource`] and always answers
//! from the latest license the source pushed. It fails closed: before the
//! first license arrives, and after [`clean`](LicenseState::clean), every
//! check is negative.

use crate::error::{AlertingError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// License tiers, lowest first. Alerting runs on every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    Basic,
    Standard,
    Gold,
    Platinum,
    Enterprise,
    Trial,
}

impl std::fmt::Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
            Self::Enterprise => "enterprise",
            Self::Trial => "trial",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Expired,
    Invalid,
}

/// A license as pushed by the licensing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub uid: Option<String>,
    pub license_type: LicenseType,
    pub status: LicenseStatus,
    /// False when the cluster could not report a license.
    pub is_available: bool,
}

impl License {
    pub fn active(license_type: LicenseType) -> Self {
        Self {
            uid: Some(uuid::Uuid::new_v4().to_string()),
            license_type,
            status: LicenseStatus::Active,
            is_available: true,
        }
    }

    pub fn expired(license_type: LicenseType) -> Self {
        Self {
            status: LicenseStatus::Expired,
            ..Self::active(license_type)
        }
    }

    pub fn unavailable() -> Self {
        Self {
            uid: None,
            license_type: LicenseType::Basic,
            status: LicenseStatus::Invalid,
            is_available: false,
        }
    }
}

/// Result of a license check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseCheck {
    /// Whether alerting should be shown at all.
    pub show_app_link: bool,
    /// Whether the alerting API may be used.
    pub enable_app_link: bool,
    /// Why the API is disabled.
    pub message: Option<String>,
}

impl LicenseCheck {
    fn valid() -> Self {
        Self {
            show_app_link: true,
            enable_app_link: true,
            message: None,
        }
    }

    fn disabled(show_app_link: bool, message: impl Into<String>) -> Self {
        Self {
            show_app_link,
            enable_app_link: false,
            message: Some(message.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.enable_app_link
    }

    fn evaluate(license: Option<&License>) -> Self {
        let Some(license) = license.filter(|l| l.is_available) else {
            return Self::disabled(
                true,
                "Alerting is unavailable - license information is not available at this time.",
            );
        };

        match license.status {
            LicenseStatus::Expired => Self::disabled(
                true,
                format!(
                    "Alerting is unavailable - your {} license has expired.",
                    license.license_type
                ),
            ),
            LicenseStatus::Invalid => {
                Self::disabled(false, "Alerting is unavailable - license is invalid.")
            }
            LicenseStatus::Active => Self::valid(),
        }
    }
}

/// Pushes license updates.
pub trait LicenseSource: Send + Sync {
    /// Receiver holding the latest license, `None` until the first one.
    fn subscribe(&self) -> watch::Receiver<Option<License>>;
}

enum Subscription {
    Active(watch::Receiver<Option<License>>),
    Cleaned,
}

/// Latest license, shared by every gated operation.
pub struct LicenseState {
    subscription: Mutex<Subscription>,
}

impl LicenseState {
    pub fn new(source: &dyn LicenseSource) -> Self {
        Self {
            subscription: Mutex::new(Subscription::Active(source.subscribe())),
        }
    }

    /// Check the latest license.
    pub fn check_license(&self) -> LicenseCheck {
        match &*self.subscription.lock() {
            Subscription::Active(receiver) => LicenseCheck::evaluate(receiver.borrow().as_ref()),
            Subscription::Cleaned => LicenseCheck::evaluate(None),
        }
    }

    /// Fail with [`AlertingError::LicenseInvalid`] unless the latest license
    /// allows the API.
    pub fn ensure_valid(&self) -> Result<()> {
        let check = self.check_license();
        if check.is_valid() {
            return Ok(());
        }
        Err(AlertingError::LicenseInvalid {
            reason: check
                .message
                .unwrap_or_else(|| "Alerting is unavailable".to_string()),
        })
    }

    /// Drop the subscription. Safe to call more than once.
    pub fn clean(&self) {
        let mut subscription = self.subscription.lock();
        if matches!(*subscription, Subscription::Active(_)) {
            debug!(target: "plugins::alerting", "unsubscribing from license updates");
        }
        *subscription = Subscription::Cleaned;
    }

    pub fn is_cleaned(&self) -> bool {
        matches!(*self.subscription.lock(), Subscription::Cleaned)
    }
}

impl std::fmt::Debug for LicenseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseState")
            .field("cleaned", &self.is_cleaned())
            .field("check", &self.check_license())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LicenseFeed;

    #[test]
    fn test_fails_closed_before_first_license() {
        let feed = LicenseFeed::new();
        let state = LicenseState::new(&feed);

        let check = state.check_license();
        assert!(!check.is_valid());
        assert!(check.message.unwrap().contains("not available"));
        assert!(matches!(
            state.ensure_valid().unwrap_err(),
            AlertingError::LicenseInvalid { .. }
        ));
    }

    #[test]
    fn test_updates_are_seen_immediately() {
        let feed = LicenseFeed::new();
        let state = LicenseState::new(&feed);

        feed.publish(License::active(LicenseType::Basic));
        assert!(state.check_license().is_valid());

        feed.publish(License::expired(LicenseType::Gold));
        let check = state.check_license();
        assert!(!check.is_valid());
        assert!(check.show_app_link);
        assert_eq!(
            check.message.as_deref(),
            Some("Alerting is unavailable - your gold license has expired.")
        );

        feed.publish(License::active(LicenseType::Platinum));
        assert!(state.ensure_valid().is_ok());
    }

    #[test]
    fn test_unavailable_and_invalid() {
        let feed = LicenseFeed::new();
        let state = LicenseState::new(&feed);

        feed.publish(License::unavailable());
        assert!(!state.check_license().is_valid());

        feed.publish(License {
            status: LicenseStatus::Invalid,
            ..License::active(LicenseType::Gold)
        });
        let check = state.check_license();
        assert!(!check.is_valid());
        assert!(!check.show_app_link);
    }

    #[test]
    fn test_clean_is_idempotent_and_fails_closed() {
        let feed = LicenseFeed::with_license(License::active(LicenseType::Trial));
        let state = LicenseState::new(&feed);
        assert!(state.check_license().is_valid());

        state.clean();
        state.clean();

        assert!(state.is_cleaned());
        assert!(!state.check_license().is_valid());
        assert_eq!(feed.subscriber_count(), 0);

        // Later pushes are ignored.
        feed.publish(License::active(LicenseType::Trial));
        assert!(!state.check_license().is_valid());
    }

    #[test]
    fn test_license_type_ordering() {
        assert!(LicenseType::Basic < LicenseType::Gold);
        assert!(LicenseType::Enterprise < LicenseType::Trial);
    }

    #[test]
    fn test_every_active_tier_is_valid() {
        let feed = LicenseFeed::new();
        let state = LicenseState::new(&feed);
        for tier in [
            LicenseType::Basic,
            LicenseType::Standard,
            LicenseType::Gold,
            LicenseType::Platinum,
            LicenseType::Enterprise,
            LicenseType::Trial,
        ] {
            feed.publish(License::active(tier));
            assert_eq!(state.check_license(), LicenseCheck::valid(), "{tier}");
        }
    }
}
