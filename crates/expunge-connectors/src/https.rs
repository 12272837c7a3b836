use tracing::instrument;

use common::{
    graph::traversal::{Row, TraversalNode},
    policy::Policy,
    request::PrivacyRequest,
};

use crate::{
    connection::{ConnectionConfig, ConnectionTestStatus},
    Connector, ConnectorError, NodeInput,
};

/// An HTTPS connection exists for webhook callouts only and backs no
/// dataset. Connection tests are skipped; data operations refuse.
pub struct HttpsConnector {
    config: ConnectionConfig,
}

impl HttpsConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        HttpsConnector { config }
    }
}

#[async_trait::async_trait]
impl Connector for HttpsConnector {
    fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> Result<ConnectionTestStatus, ConnectorError> {
        Ok(ConnectionTestStatus::Skipped)
    }

    async fn retrieve(
        &self,
        _node: &TraversalNode,
        _input: &NodeInput,
        _policy: &Policy,
    ) -> Result<Vec<Row>, ConnectorError> {
        Err(ConnectorError::NoDatasetBackend(self.config.key.clone()))
    }

    async fn mask(
        &self,
        _node: &TraversalNode,
        _rows: &[Row],
        _policy: &Policy,
        _request: &PrivacyRequest,
    ) -> Result<usize, ConnectorError> {
        Err(ConnectorError::NoDatasetBackend(self.config.key.clone()))
    }
}
