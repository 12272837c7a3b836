use std::collections::BTreeMap;

use tracing::info;

use common::{graph::traversal::Row, request::PrivacyRequest};

use crate::ApiError;

/// Delivery of the assembled access-request result, keyed by result-store
/// key. Packaging and transport (and encryption, when the request carries a
/// key) belong to the implementation.
#[async_trait::async_trait]
pub trait AccessResultUploader: Send + Sync {
    async fn upload(
        &self,
        request: &PrivacyRequest,
        results: BTreeMap<String, Vec<Row>>,
    ) -> Result<(), ApiError>;
}

/// Logs and discards results. Suitable for devmode.
pub struct NoopUploader;

#[async_trait::async_trait]
impl AccessResultUploader for NoopUploader {
    async fn upload(
        &self,
        request: &PrivacyRequest,
        results: BTreeMap<String, Vec<Row>>,
    ) -> Result<(), ApiError> {
        info!(
            request = %request.id,
            collections = results.len(),
            "Discarding access request results"
        );
        Ok(())
    }
}
