//! Alerts API routes.
//!
//! Each route decodes a [`RouteRequest`], obtains an alerts client for the
//! caller and calls exactly one client operation. Transport (HTTP server,
//! encoding, auth) belongs to whatever implements [`RouteRegistrar`].

use crate::alert::{CreateAlertData, FindOptions, UpdateAlertData};
use crate::alert_type::RegisteredAlertType;
use crate::client::AlertsClient;
use crate::error::{AlertingError, Result};
use crate::tenant::RequestIdentity;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// A decoded request.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub identity: RequestIdentity,
    /// Path parameters, by the names in the route path.
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl RouteRequest {
    pub fn new(identity: RequestIdentity) -> Self {
        Self {
            identity,
            params: HashMap::new(),
            query: HashMap::new(),
            body: Value::Null,
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    fn param(&self, name: &str) -> Result<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AlertingError::BadRequest(format!("missing path parameter {name}")))
    }

    fn body<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| AlertingError::BadRequest(e.to_string()))
    }

    fn query_usize(&self, name: &str, default: usize) -> Result<usize> {
        match self.query.get(name) {
            Some(v) => v
                .parse()
                .map_err(|_| AlertingError::BadRequest(format!("{name} must be a positive integer"))),
            None => Ok(default),
        }
    }
}

/// A route's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    pub body: Value,
}

impl RouteResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: Value::Null,
        }
    }
}

/// Hands alerts clients to routes.
pub trait AlertsClientProvider: Send + Sync {
    fn alerts_client(&self, identity: &RequestIdentity) -> Result<AlertsClient>;

    fn list_alert_types(&self) -> BTreeSet<RegisteredAlertType>;
}

/// A registered API route.
#[async_trait]
pub trait Route: Send + Sync {
    fn method(&self) -> HttpMethod;

    /// Path template; `{name}` segments are path parameters.
    fn path(&self) -> &'static str;

    async fn handle(
        &self,
        clients: &dyn AlertsClientProvider,
        request: RouteRequest,
    ) -> Result<RouteResponse>;
}

/// Where routes get registered.
pub trait RouteRegistrar: Send + Sync {
    fn register(&self, route: Box<dyn Route>);
}

/// The alerts API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertRoute {
    Create,
    Delete,
    Find,
    Get,
    GetState,
    ListTypes,
    Update,
    Enable,
    Disable,
    UpdateApiKey,
    MuteAll,
    UnmuteAll,
    MuteInstance,
    UnmuteInstance,
}

impl AlertRoute {
    pub const ALL: [AlertRoute; 14] = [
        Self::Create,
        Self::Delete,
        Self::Find,
        Self::Get,
        Self::GetState,
        Self::ListTypes,
        Self::Update,
        Self::Enable,
        Self::Disable,
        Self::UpdateApiKey,
        Self::MuteAll,
        Self::UnmuteAll,
        Self::MuteInstance,
        Self::UnmuteInstance,
    ];
}

fn json<T: serde::Serialize>(value: &T) -> Result<RouteResponse> {
    Ok(RouteResponse::ok(serde_json::to_value(value)?))
}

#[async_trait]
impl Route for AlertRoute {
    fn method(&self) -> HttpMethod {
        match self {
            Self::Find | Self::Get | Self::GetState | Self::ListTypes => HttpMethod::Get,
            Self::Delete => HttpMethod::Delete,
            Self::Update => HttpMethod::Put,
            _ => HttpMethod::Post,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Self::Create => "/api/alert",
            Self::Delete | Self::Get | Self::Update => "/api/alert/{id}",
            Self::Find => "/api/alert/_find",
            Self::GetState => "/api/alert/{id}/state",
            Self::ListTypes => "/api/alert/types",
            Self::Enable => "/api/alert/{id}/_enable",
            Self::Disable => "/api/alert/{id}/_disable",
            Self::UpdateApiKey => "/api/alert/{id}/_update_api_key",
            Self::MuteAll => "/api/alert/{id}/_mute_all",
            Self::UnmuteAll => "/api/alert/{id}/_unmute_all",
            Self::MuteInstance => "/api/alert/{alert_id}/alert_instance/{alert_instance_id}/_mute",
            Self::UnmuteInstance => "/api/alert/{alert_id}/alert_instance/{alert_instance_id}/_unmute",
        }
    }

    async fn handle(
        &self,
        clients: &dyn AlertsClientProvider,
        request: RouteRequest,
    ) -> Result<RouteResponse> {
        // Listing types needs no client, so it works while clients are refused.
        let client = || clients.alerts_client(&request.identity);

        match self {
            Self::ListTypes => json(&clients.list_alert_types()),
            Self::Create => {
                let client = client()?;
                let data: CreateAlertData = request.body()?;
                json(&client.create(data).await?)
            }
            Self::Delete => {
                client()?.delete(request.param("id")?).await?;
                Ok(RouteResponse::no_content())
            }
            Self::Find => {
                let client = client()?;
                let options = FindOptions {
                    page: request.query_usize("page", 1)?,
                    per_page: request.query_usize("per_page", 20)?,
                    search: request.query.get("search").cloned(),
                    alert_type_id: request.query.get("alert_type_id").cloned(),
                };
                json(&client.find(options).await?)
            }
            Self::Get => json(&client()?.get(request.param("id")?).await?),
            Self::GetState => json(&client()?.get_alert_state(request.param("id")?).await?),
            Self::Update => {
                let client = client()?;
                let data: UpdateAlertData = request.body()?;
                json(&client.update(request.param("id")?, data).await?)
            }
            Self::Enable => {
                client()?.enable(request.param("id")?).await?;
                Ok(RouteResponse::no_content())
            }
            Self::Disable => {
                client()?.disable(request.param("id")?).await?;
                Ok(RouteResponse::no_content())
            }
            Self::UpdateApiKey => {
                client()?.update_api_key(request.param("id")?).await?;
                Ok(RouteResponse::no_content())
            }
            Self::MuteAll => {
                client()?.mute_all(request.param("id")?).await?;
                Ok(RouteResponse::no_content())
            }
            Self::UnmuteAll => {
                client()?.unmute_all(request.param("id")?).await?;
                Ok(RouteResponse::no_content())
            }
            Self::MuteInstance => {
                client()?
                    .mute_instance(request.param("alert_id")?, request.param("alert_instance_id")?)
                    .await?;
                Ok(RouteResponse::no_content())
            }
            Self::UnmuteInstance => {
                client()?
                    .unmute_instance(request.param("alert_id")?, request.param("alert_instance_id")?)
                    .await?;
                Ok(RouteResponse::no_content())
            }
        }
    }
}
