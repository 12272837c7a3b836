use tokio::sync::mpsc;
use tokio::sync::mpsc::Sender;
use tracing::{error, instrument, trace};

use common::dataset::input::DatasetInput;

use crate::commands::{
    ApiCommand, ApiResponse, ResumeCommand, SubmitCommand, ValidateDatasetCommand,
};
use crate::ApiError;

pub type ApiSendWithReply = (ApiCommand, Sender<Result<ApiResponse, ApiError>>);

/// A clonable api handle
#[derive(Debug, Clone)]
pub struct ApiDispatch {
    pub(crate) tx: Sender<ApiSendWithReply>,
}

impl ApiDispatch {
    #[instrument]
    pub async fn dispatch(&self, command: ApiCommand) -> Result<ApiResponse, ApiError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        trace!(?command, "Dispatch command to api");
        self.tx.clone().send((command, reply_tx)).await?;

        let reply = reply_rx.recv().await;

        if let Some(Err(ref error)) = reply {
            error!(?error, "Api dispatch");
        }

        reply.ok_or(ApiError::ApiShutdownRx)?
    }

    #[instrument]
    pub async fn submit_privacy_request(
        &self,
        request_id: &str,
        allow_partial_traversal: bool,
    ) -> Result<ApiResponse, ApiError> {
        self.dispatch(ApiCommand::Submit(SubmitCommand {
            request_id: request_id.to_owned(),
            allow_partial_traversal,
        }))
        .await
    }

    #[instrument]
    pub async fn resume_privacy_request(
        &self,
        request_id: &str,
        after_webhook_key: &str,
    ) -> Result<ApiResponse, ApiError> {
        self.dispatch(ApiCommand::Resume(ResumeCommand {
            request_id: request_id.to_owned(),
            after_webhook_key: after_webhook_key.to_owned(),
        }))
        .await
    }

    #[instrument(skip(dataset))]
    pub async fn validate_dataset(
        &self,
        connection_key: &str,
        dataset: DatasetInput,
    ) -> Result<ApiResponse, ApiError> {
        self.dispatch(ApiCommand::ValidateDataset(ValidateDatasetCommand {
            connection_key: connection_key.to_owned(),
            dataset,
        }))
        .await
    }
}
