use serde::{Deserialize, Serialize};

use common::{
    dataset::{input::DatasetInput, Dataset},
    graph::traversal::TraversalDetails,
    request::PrivacyRequest,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCommand {
    pub request_id: String,
    /// Proceed over the reachable subset when some nodes cannot be reached
    /// from the identity root. Off by default; the request errors instead.
    pub allow_partial_traversal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeCommand {
    pub request_id: String,
    /// Key of the last pre-execution webhook that completed before the
    /// pause; execution restarts strictly after it
    pub after_webhook_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateDatasetCommand {
    pub connection_key: String,
    pub dataset: DatasetInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiCommand {
    Submit(SubmitCommand),
    Resume(ResumeCommand),
    ValidateDataset(ValidateDatasetCommand),
}

#[derive(Debug)]
pub enum ApiResponse {
    /// The request was driven as far as it can go; its terminal or paused
    /// state is on the returned record
    Request { request: PrivacyRequest },
    /// The dataset definition parsed and was checked for traversability
    DatasetValidated { dataset: Box<Dataset>, traversal_details: TraversalDetails },
}

impl ApiResponse {
    pub fn request(request: PrivacyRequest) -> Self {
        ApiResponse::Request { request }
    }

    pub fn dataset_validated(dataset: Dataset, traversal_details: TraversalDetails) -> Self {
        ApiResponse::DatasetValidated { dataset: Box::new(dataset), traversal_details }
    }
}
