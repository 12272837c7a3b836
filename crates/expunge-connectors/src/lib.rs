#![cfg_attr(feature = "strict", deny(warnings))]
//! Uniform execute/mask contract over heterogeneous backends.
//!
//! A connector composes a query config appropriate to its dialect with a
//! driver client. Drivers are trait seams; the concrete network transport of
//! each backend lives behind them.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use common::{
    cache::{Cache, CacheError},
    dataset::CollectionAddress,
    graph::traversal::{Row, TraversalNode},
    policy::Policy,
    request::PrivacyRequest,
};
use expunge_masking::MaskingError;

pub mod connection;
pub mod document;
pub mod https;
pub mod query;
pub mod sql;

pub use connection::{AccessLevel, ConnectionConfig, ConnectionTestStatus, ConnectionType};
pub use document::{DocumentClient, DocumentConnector};
pub use https::HttpsConnector;
pub use sql::{SqlClient, SqlConnector};

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("No values were erased since this connection {0} has not been given write access")]
    WriteAccessDenied(String),

    #[error("Backend execution failed for {address}: {message}")]
    Execution { address: CollectionAddress, message: String },

    #[error("Masking: {0}")]
    Masking(
        #[from]
        #[source]
        MaskingError,
    ),

    #[error("Cache: {0}")]
    Cache(
        #[from]
        #[source]
        CacheError,
    ),

    #[error("Connection {0} was given a driver that does not match its connection type")]
    DriverMismatch(String),

    #[error("Connection {0} has no dataset backend")]
    NoDatasetBackend(String),
}

/// Values available to filter one node's retrieval query, keyed by dotted
/// field path
pub type NodeInput = BTreeMap<String, Vec<Value>>;

/// Capability set every backend connector provides
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    fn connection_config(&self) -> &ConnectionConfig;

    /// Validate the backend credentials without touching any data
    async fn test_connection(&self) -> Result<ConnectionTestStatus, ConnectorError>;

    /// Run the node's retrieval query with the supplied input values
    async fn retrieve(
        &self,
        node: &TraversalNode,
        input: &NodeInput,
        policy: &Policy,
    ) -> Result<Vec<Row>, ConnectorError>;

    /// Write masked values back for every retrieved row, returning how many
    /// rows were updated. Connectors without write access must refuse.
    async fn mask(
        &self,
        node: &TraversalNode,
        rows: &[Row],
        policy: &Policy,
        request: &PrivacyRequest,
    ) -> Result<usize, ConnectorError>;
}

/// The driver a deployment supplies for one connection
pub enum BackendDriver {
    Sql(Arc<dyn SqlClient>),
    Document(Arc<dyn DocumentClient>),
    /// HTTPS connections call out to webhook endpoints and need no driver
    WebhookOnly,
}

/// Build the connector for a connection from its configured type and the
/// driver supplied for it. Called at startup for every configured
/// connection to populate the runner's connector set. HTTPS connections
/// back no dataset; their connection test is skipped.
pub fn connector_for(
    config: &ConnectionConfig,
    driver: BackendDriver,
    cache: Arc<dyn Cache>,
) -> Result<Arc<dyn Connector>, ConnectorError> {
    match (config.connection_type, driver) {
        (ConnectionType::Https, _) => Ok(Arc::new(HttpsConnector::new(config.clone()))),
        (ConnectionType::Mongodb, BackendDriver::Document(client)) =>
            Ok(Arc::new(DocumentConnector::new(config.clone(), client, cache))),
        (
            ConnectionType::Postgres
            | ConnectionType::Mysql
            | ConnectionType::Mssql
            | ConnectionType::Redshift
            | ConnectionType::Snowflake,
            BackendDriver::Sql(client),
        ) => Ok(Arc::new(SqlConnector::new(config.clone(), client, cache))),
        _ => Err(ConnectorError::DriverMismatch(config.key.clone())),
    }
}
