//! License gating.
//!
//! Gated operations consult the latest license first and are rejected with
//! [`AlertingError::LicenseInvalid`](crate::AlertingError::LicenseInvalid)
//! before any of their own work runs.

use crate::error::Result;
use crate::license::LicenseState;
use crate::routes::{AlertsClientProvider, HttpMethod, Route, RouteRequest, RouteResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Run `operation` only if the current license allows it.
pub fn with_license_check<T>(license: &LicenseState, operation: impl FnOnce() -> Result<T>) -> Result<T> {
    license.ensure_valid()?;
    operation()
}

/// A route that checks the license before handling.
pub struct LicenseCheckedRoute<R> {
    inner: R,
    license: Arc<LicenseState>,
}

/// Wrap `route` so every request is checked against `license` first.
pub fn extend_route_with_license_check<R: Route>(route: R, license: Arc<LicenseState>) -> LicenseCheckedRoute<R> {
    LicenseCheckedRoute { inner: route, license }
}

impl<R> LicenseCheckedRoute<R> {
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: Route> Route for LicenseCheckedRoute<R> {
    fn method(&self) -> HttpMethod {
        self.inner.method()
    }

    fn path(&self) -> &'static str {
        self.inner.path()
    }

    async fn handle(
        &self,
        clients: &dyn AlertsClientProvider,
        request: RouteRequest,
    ) -> Result<RouteResponse> {
        if let Err(err) = self.license.ensure_valid() {
            debug!(
                target: "plugins::alerting",
                method = %self.method(),
                path = self.path(),
                "rejecting request: {err}"
            );
            return Err(err);
        }
        self.inner.handle(clients, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_type::RegisteredAlertType;
    use crate::client::AlertsClient;
    use crate::error::AlertingError;
    use crate::license::{License, LicenseType};
    use crate::memory::LicenseFeed;
    use crate::tenant::RequestIdentity;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRoute(Arc<AtomicUsize>);

    #[async_trait]
    impl Route for CountingRoute {
        fn method(&self) -> HttpMethod {
            HttpMethod::Get
        }

        fn path(&self) -> &'static str {
            "/api/alert/types"
        }

        async fn handle(&self, _: &dyn AlertsClientProvider, _: RouteRequest) -> Result<RouteResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RouteResponse::no_content())
        }
    }

    struct NoClients;

    impl AlertsClientProvider for NoClients {
        fn alerts_client(&self, _: &RequestIdentity) -> Result<AlertsClient> {
            Err(AlertingError::Lifecycle("no clients in this test".into()))
        }

        fn list_alert_types(&self) -> BTreeSet<RegisteredAlertType> {
            BTreeSet::new()
        }
    }

    #[tokio::test]
    async fn test_route_runs_only_with_valid_license() {
        let feed = LicenseFeed::new();
        let license = Arc::new(LicenseState::new(&feed));
        let calls = Arc::new(AtomicUsize::new(0));
        let route = extend_route_with_license_check(CountingRoute(calls.clone()), license);
        let request = || RouteRequest::new(RequestIdentity::new("/api/alert/types"));

        let err = route.handle(&NoClients, request()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        feed.publish(License::active(LicenseType::Basic));
        assert_eq!(route.handle(&NoClients, request()).await.unwrap().status, 204);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        feed.publish(License::expired(LicenseType::Basic));
        assert!(route.handle(&NoClients, request()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_license_check_skips_operation() {
        let feed = LicenseFeed::new();
        let license = LicenseState::new(&feed);
        let mut ran = false;
        assert!(with_license_check(&license, || {
            ran = true;
            Ok(())
        })
        .is_err());
        assert!(!ran);
    }
}
