use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::policy::ActionType;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyRequestStatus {
	Pending,
	InProcessing,
	Paused,
	Complete,
	Error,
}

/// PII grouping pertaining to a single human. Only known identity kinds may
/// be supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestIdentity {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone_number: Option<String>,
}

impl RequestIdentity {
	pub fn kinds(&self) -> BTreeSet<String> {
		let mut kinds = BTreeSet::new();
		if self.email.is_some() {
			kinds.insert("email".to_string());
		}
		if self.phone_number.is_some() {
			kinds.insert("phone_number".to_string());
		}
		kinds
	}

	pub fn value(&self, kind: &str) -> Option<&str> {
		match kind {
			"email" => self.email.as_deref(),
			"phone_number" => self.phone_number.as_deref(),
			_ => None,
		}
	}

	/// Fold identity values derived downstream (e.g. by a two-way webhook)
	/// into this identity. Supplied values win over existing ones.
	pub fn merge(&mut self, derived: &RequestIdentity) {
		if derived.email.is_some() {
			self.email = derived.email.clone();
		}
		if derived.phone_number.is_some() {
			self.phone_number = derived.phone_number.clone();
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyRequest {
	pub id: String,
	pub policy_key: String,
	pub requested_at: DateTime<Utc>,
	pub status: PrivacyRequestStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub started_processing_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finished_processing_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub encryption_key: Option<String>,
}

impl PrivacyRequest {
	pub fn new(policy_key: impl AsRef<str>, requested_at: DateTime<Utc>) -> Self {
		PrivacyRequest {
			id: Uuid::new_v4().to_string(),
			policy_key: policy_key.as_ref().to_owned(),
			requested_at,
			status: PrivacyRequestStatus::Pending,
			started_processing_at: None,
			finished_processing_at: None,
			encryption_key: None,
		}
	}

	/// Move into processing. `started_processing_at` is only written the
	/// first time so a retried request keeps its original start time.
	pub fn start_processing(&mut self, now: DateTime<Utc>) {
		self.status = PrivacyRequestStatus::InProcessing;
		if self.started_processing_at.is_none() {
			self.started_processing_at = Some(now);
		}
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionLogStatus {
	Pending,
	InProcessing,
	Complete,
	Error,
	Retrying,
}

/// Append-only record of what happened to one collection during one action
/// of a privacy request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
	pub dataset_key: String,
	pub collection_name: String,
	pub action_type: ActionType,
	pub status: ExecutionLogStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub updated_at: DateTime<Utc>,
}

pub fn identity_cache_key(request_id: &str, kind: &str) -> String {
	format!("id-{request_id}-identity-{kind}")
}

pub fn encryption_cache_key(request_id: &str) -> String {
	format!("id-{request_id}-encryption-key")
}

pub fn masking_secret_cache_key(request_id: &str, strategy: &str, secret_type: &str) -> String {
	format!("id-{request_id}-masking-secret-{strategy}-{secret_type}")
}

/// Key under which one collection's retrieved rows are stored for the
/// duration of a request
pub fn access_result_key(request_id: &str, dataset_key: &str, collection_name: &str) -> String {
	format!("EN_{request_id}__access_request__{dataset_key}:{collection_name}")
}

pub fn access_result_prefix(request_id: &str) -> String {
	format!("EN_{request_id}__access_request__")
}
