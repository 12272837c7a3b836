use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

use common::{
    cache::CacheError, dataset::DatasetError, graph::traversal::TraversalError,
    graph::GraphError,
};
use expunge_connectors::ConnectorError;
use expunge_masking::MaskingError;

use crate::{dispatch::ApiSendWithReply, persistence::StoreError, webhook::WebhookError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Storage: {0}")]
    Store(
        #[from]
        #[source]
        StoreError,
    ),

    #[error("Cache: {0}")]
    Cache(
        #[from]
        #[source]
        CacheError,
    ),

    #[error("Dataset: {0}")]
    Dataset(
        #[from]
        #[source]
        DatasetError,
    ),

    #[error("Graph: {0}")]
    Graph(
        #[from]
        #[source]
        GraphError,
    ),

    #[error("Traversal: {0}")]
    Traversal(
        #[from]
        #[source]
        TraversalError,
    ),

    #[error("Connector: {0}")]
    Connector(
        #[from]
        #[source]
        ConnectorError,
    ),

    #[error("Masking: {0}")]
    Masking(
        #[from]
        #[source]
        MaskingError,
    ),

    #[error("Webhook: {0}")]
    Webhook(
        #[from]
        #[source]
        WebhookError,
    ),

    #[error("No connector is registered for connection {0}")]
    MissingConnector(String),

    #[error("Privacy request {id} cannot be {operation} from status {status}")]
    InvalidRequestStatus { id: String, status: String, operation: &'static str },

    #[error("Upload: {0}")]
    Upload(String),

    #[error("Api shut down before reply")]
    ApiShutdownRx,

    #[error("Api shut down before send: {0}")]
    ApiShutdownTx(
        #[from]
        #[source]
        SendError<ApiSendWithReply>,
    ),
}
