use std::sync::Arc;

use tracing::{info, instrument};

use common::{
    cache::Cache,
    dataset::CollectionAddress,
    graph::traversal::{Row, TraversalNode},
    policy::Policy,
    request::PrivacyRequest,
};

use crate::{
    connection::{AccessLevel, ConnectionConfig, ConnectionTestStatus},
    query::document::{Document, DocumentQueryConfig},
    Connector, ConnectorError, NodeInput,
};

/// Driver seam for document stores
#[async_trait::async_trait]
pub trait DocumentClient: Send + Sync {
    async fn ping(&self) -> Result<(), ConnectorError>;

    async fn find(
        &self,
        address: &CollectionAddress,
        filter: &Document,
        projection: &Document,
    ) -> Result<Vec<Row>, ConnectorError>;

    /// Apply an update document to every record matching the filter,
    /// returning the count modified
    async fn update(
        &self,
        address: &CollectionAddress,
        filter: &Document,
        update: &Document,
    ) -> Result<usize, ConnectorError>;
}

pub struct DocumentConnector {
    config: ConnectionConfig,
    client: Arc<dyn DocumentClient>,
    cache: Arc<dyn Cache>,
}

impl DocumentConnector {
    pub fn new(
        config: ConnectionConfig,
        client: Arc<dyn DocumentClient>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        DocumentConnector { config, client, cache }
    }
}

#[async_trait::async_trait]
impl Connector for DocumentConnector {
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
        let query_config = DocumentQueryConfig::new(node);
        match query_config.generate_query(input) {
            None => Ok(vec![]),
            Some((filter, projection)) => {
                info!(
                    query = %query_config.query_to_string(&(filter.clone(), projection.clone())),
                    "Retrieving documents"
                );
                self.client.find(&node.address, &filter, &projection).await
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
        let query_config = DocumentQueryConfig::new(node);
        let mut updated = 0;
        for row in rows {
            if let Some((pk_filter, set_document)) = query_config
                .generate_update_stmt(row, policy, &request.id, self.cache.clone())
                .await?
            {
                updated += self.client.update(&node.address, &pk_filter, &set_document).await?;
            }
        }
        Ok(updated)
    }
}
