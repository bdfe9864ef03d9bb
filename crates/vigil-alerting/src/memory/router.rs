//! In-process route table.

use super::PathSpaces;
use crate::error::{AlertingError, Result};
use crate::routes::{AlertsClientProvider, HttpMethod, Route, RouteRegistrar, RouteRequest, RouteResponse};
use crate::tenant::RequestIdentity;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Holds registered routes and dispatches requests to them by method and
/// path. Paths may carry a `/s/<space id>` prefix and a query string.
#[derive(Default)]
pub struct MemoryRouter {
    routes: RwLock<Vec<Arc<dyn Route>>>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered `(method, path template)` pairs, in registration order.
    pub fn routes(&self) -> Vec<(HttpMethod, &'static str)> {
        self.routes.read().iter().map(|r| (r.method(), r.path())).collect()
    }

    pub async fn call(
        &self,
        clients: &dyn AlertsClientProvider,
        method: HttpMethod,
        path: &str,
        principal: Option<&str>,
        body: Value,
    ) -> Result<RouteResponse> {
        let (full_path, query) = match path.split_once('?') {
            Some((p, q)) => (p, parse_query(q)),
            None => (path, HashMap::new()),
        };
        let (_, route_path) = PathSpaces::split_space_prefix(full_path);

        let (route, params) = self
            .resolve(method, route_path)
            .ok_or_else(|| AlertingError::not_found("route", &format!("{method} {route_path}")))?;

        let mut identity = RequestIdentity::new(full_path);
        if let Some(principal) = principal {
            identity = identity.with_principal(principal);
        }
        let mut request = RouteRequest::new(identity).with_body(body);
        request.params = params;
        request.query = query;

        debug!(target: "plugins::http", %method, path = full_path, template = route.path(), "dispatching request");
        route.handle(clients, request).await
    }

    /// The matching route with the most literal segments.
    fn resolve(&self, method: HttpMethod, path: &str) -> Option<(Arc<dyn Route>, HashMap<String, String>)> {
        let routes = self.routes.read();
        routes
            .iter()
            .filter(|r| r.method() == method)
            .filter_map(|r| match_template(r.path(), path).map(|(score, params)| (score, r, params)))
            .max_by_key(|(score, _, _)| *score)
            .map(|(_, route, params)| (Arc::clone(route), params))
    }
}

impl RouteRegistrar for MemoryRouter {
    fn register(&self, route: Box<dyn Route>) {
        self.routes.write().push(Arc::from(route));
    }
}

fn match_template(template: &str, path: &str) -> Option<(usize, HashMap<String, String>)> {
    let expected: Vec<&str> = template.trim_matches('/').split('/').collect();
    let actual: Vec<&str> = path.trim_matches('/').split('/').collect();
    if expected.len() != actual.len() {
        return None;
    }

    let mut literals = 0;
    let mut params = HashMap::new();
    for (segment, value) in expected.into_iter().zip(actual) {
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) if !value.is_empty() => {
                params.insert(name.to_string(), value.to_string());
            }
            Some(_) => return None,
            None if segment == value => literals += 1,
            None => return None,
        }
    }
    Some((literals, params))
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
