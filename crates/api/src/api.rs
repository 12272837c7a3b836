use std::collections::BTreeSet;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, instrument};

use common::graph::{
    traversal::{TraversalDetails, TraversalPlan},
    DatasetGraph,
};

use crate::{
    commands::{
        ApiCommand, ApiResponse, ResumeCommand, SubmitCommand, ValidateDatasetCommand,
    },
    dispatch::{ApiDispatch, ApiSendWithReply},
    persistence::StoreError,
    runner::{PrivacyRequestRunner, RunnerContext},
    ApiError,
};

/// The api task: commands arrive over a channel and each is driven to
/// completion before the next is taken. Runners for distinct requests may
/// run in parallel across api instances; they share only the cache and the
/// store.
pub struct Api {
    context: RunnerContext,
}

impl Api {
    /// Spawn the command loop, returning a clonable dispatch handle
    #[instrument(skip(context))]
    pub fn create_dispatch(context: RunnerContext) -> (ApiDispatch, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ApiSendWithReply>(10);
        let api = Api { context };

        let handle = tokio::task::spawn(async move {
            while let Some((command, reply)) = rx.recv().await {
                let result = api.dispatch_command(command).await;
                reply.send(result).await.ok();
            }
            info!("Api command channel closed");
        });

        (ApiDispatch { tx }, handle)
    }

    async fn dispatch_command(&self, command: ApiCommand) -> Result<ApiResponse, ApiError> {
        match command {
            ApiCommand::Submit(command) => self.submit_privacy_request(command).await,
            ApiCommand::Resume(command) => self.resume_privacy_request(command).await,
            ApiCommand::ValidateDataset(command) => self.validate_dataset(command).await,
        }
    }

    async fn submit_privacy_request(
        &self,
        command: SubmitCommand,
    ) -> Result<ApiResponse, ApiError> {
        let request = self
            .context
            .store
            .privacy_request(&command.request_id)
            .await?
            .ok_or(StoreError::RecordNotFound)?;
        let runner = PrivacyRequestRunner::new(self.context.clone(), request);
        Ok(ApiResponse::request(runner.submit(command.allow_partial_traversal).await?))
    }

    async fn resume_privacy_request(
        &self,
        command: ResumeCommand,
    ) -> Result<ApiResponse, ApiError> {
        let request = self
            .context
            .store
            .privacy_request(&command.request_id)
            .await?
            .ok_or(StoreError::RecordNotFound)?;
        let runner = PrivacyRequestRunner::new(self.context.clone(), request);
        Ok(ApiResponse::request(runner.resume(&command.after_webhook_key).await?))
    }

    /// Parse and validate a dataset definition against the graph it would
    /// join, without persisting anything
    async fn validate_dataset(
        &self,
        command: ValidateDatasetCommand,
    ) -> Result<ApiResponse, ApiError> {
        self.context
            .store
            .connection(&command.connection_key)
            .await?
            .ok_or(StoreError::RecordNotFound)?;
        let dataset = command.dataset.into_dataset(&command.connection_key)?;

        let mut datasets = self.context.store.datasets().await?;
        datasets.retain(|d| d.fides_key != dataset.fides_key);
        datasets.push(dataset.clone());

        let identity_kinds =
            BTreeSet::from(["email".to_string(), "phone_number".to_string()]);
        let traversal_details = match DatasetGraph::new(&datasets, &identity_kinds) {
            Ok(graph) => TraversalPlan::new(&graph).details(),
            Err(e) => TraversalDetails { is_traversable: false, msg: Some(e.to_string()) },
        };

        Ok(ApiResponse::dataset_validated(dataset, traversal_details))
    }
}
