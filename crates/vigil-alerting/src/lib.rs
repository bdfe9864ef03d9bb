//! Vigil alerting.
//!
//! Runs user-defined alerts on a schedule and fires actions when they match.
//!
//! # Architecture
//!
//! - **Registry**: [`AlertTypeRegistry`] holds the alert types other plugins
//!   contribute and registers one scheduler task type per alert type.
//! - **Execution**: [`TaskRunnerFactory`] builds a [`TaskRunner`] per
//!   scheduled run. A run decrypts the alert's credential, executes the alert
//!   type and dispatches actions for the instances that fired.
//! - **Clients**: [`AlertsClientFactory`] mints space-scoped
//!   [`AlertsClient`]s that create and manage alerts.
//! - **Gating**: [`LicenseState`] tracks the latest license; every route is
//!   wrapped so it is rejected while the license does not allow alerting.
//! - **Lifecycle**: [`AlertingPlugin`] wires the above in `setup`, `start`
//!   and `stop`.
//!
//! Collaborators (storage, scheduler, actions, spaces, security, licensing)
//! are traits in [`services`]; [`memory`] has in-process implementations.

pub mod alert;
pub mod alert_instance;
pub mod alert_type;
pub mod client;
pub mod client_factory;
pub mod error;
pub mod gate;
pub mod interval;
pub mod license;
pub mod memory;
pub mod plugin;
pub mod registry;
pub mod routes;
pub mod services;
pub mod task_runner;
pub mod templating;
pub mod tenant;

pub use alert::{Alert, AlertAction, CreateAlertData, FindOptions, FindResult, UpdateAlertData};
pub use alert_instance::AlertInstanceFactory;
pub use alert_type::{AlertExecutor, AlertServices, AlertType, ExecutorOptions, RegisteredAlertType};
pub use client::AlertsClient;
pub use client_factory::{AlertsClientFactory, AlertsClientFactoryOptions};
pub use error::{AlertingError, Result};
pub use gate::{extend_route_with_license_check, with_license_check};
pub use interval::Interval;
pub use license::{License, LicenseCheck, LicenseState, LicenseType};
pub use plugin::{AlertingPlugin, CoreSetup, CoreStart, PluginSetup, PluginStart, PluginsSetup, PluginsStart};
pub use registry::AlertTypeRegistry;
pub use task_runner::{TaskRunner, TaskRunnerFactory};
pub use tenant::{RequestIdentity, TenantContext, TenantResolver};
