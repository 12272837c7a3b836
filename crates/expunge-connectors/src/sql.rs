use std::sync::Arc;

use tracing::{info, instrument};

use common::{
    cache::Cache,
    graph::traversal::{Row, TraversalNode},
    policy::Policy,
    request::PrivacyRequest,
};

use crate::{
    connection::{AccessLevel, ConnectionConfig, ConnectionTestStatus, ConnectionType},
    query::sql::{SqlDialect, SqlQueryConfig, SqlStatement},
    Connector, ConnectorError, NodeInput,
};

/// Driver seam for SQL backends. Implementations own connection pooling and
/// the wire protocol.
#[async_trait::async_trait]
pub trait SqlClient: Send + Sync {
    /// Cheap liveness probe, e.g. `SELECT 1`
    async fn ping(&self) -> Result<(), ConnectorError>;

    async fn select(&self, statement: &SqlStatement) -> Result<Vec<Row>, ConnectorError>;

    /// Run a mutating statement, returning the affected row count
    async fn execute(&self, statement: &SqlStatement) -> Result<usize, ConnectorError>;
}

pub struct SqlConnector {
    config: ConnectionConfig,
    dialect: SqlDialect,
    client: Arc<dyn SqlClient>,
    cache: Arc<dyn Cache>,
}

impl SqlConnector {
    pub fn new(config: ConnectionConfig, client: Arc<dyn SqlClient>, cache: Arc<dyn Cache>) -> Self {
        let dialect = match config.connection_type {
            ConnectionType::Snowflake => SqlDialect::Snowflake,
            ConnectionType::Redshift => SqlDialect::Redshift,
            ConnectionType::Mssql => SqlDialect::MicrosoftSql,
            _ => SqlDialect::Generic,
        };
        SqlConnector { config, dialect, client, cache }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }
}

#[async_trait::async_trait]
impl Connector for SqlConnector {
    fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> Result<ConnectionTestStatus, ConnectorError> {
        Ok(match self.client.ping().await {
            Ok(()) => ConnectionTestStatus::Succeeded,
            Err(_) => ConnectionTestStatus::Failed,
        })
    }

    #[instrument(skip(self, input, _policy), fields(address = %node.address))]
    async fn retrieve(
        &self,
        node: &TraversalNode,
        input: &NodeInput,
        _policy: &Policy,
    ) -> Result<Vec<Row>, ConnectorError> {
        let query_config = SqlQueryConfig::new(node, self.dialect);
        match query_config.generate_query(input) {
            None => Ok(vec![]),
            Some(statement) => {
                info!(query = %query_config.query_to_string(&statement), "Retrieving rows");
                self.client.select(&statement).await
            }
        }
    }

    #[instrument(skip(self, rows, policy, request), fields(address = %node.address))]
    async fn mask(
        &self,
        node: &TraversalNode,
        rows: &[Row],
        policy: &Policy,
        request: &PrivacyRequest,
    ) -> Result<usize, ConnectorError> {
        if self.config.access == AccessLevel::Read {
            return Err(ConnectorError::WriteAccessDenied(self.config.key.clone()));
        }
        let query_config = SqlQueryConfig::new(node, self.dialect);
        let mut updated = 0;
        for row in rows {
            if let Some(statement) = query_config
                .generate_update_stmt(row, policy, &request.id, self.cache.clone())
                .await?
            {
                updated += self.client.execute(&statement).await?;
            }
        }
        Ok(updated)
    }
}
