use serde_json::Value;

use crate::dataset::{Collection, FieldPath};

/// What a rule does with the data it targets
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
	Access,
	Erasure,
}

/// A masking strategy selection as stored on a rule: a registry name plus
/// its configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingStrategyConfig {
	pub strategy: String,
	#[serde(default)]
	pub configuration: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
	pub key: String,
	pub action_type: ActionType,
	#[serde(default)]
	pub target_data_categories: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub masking_strategy: Option<MaskingStrategyConfig>,
}

impl Rule {
	/// Field paths on the collection whose categories fall under one of this
	/// rule's targets
	pub fn targeted_field_paths(&self, collection: &Collection) -> Vec<FieldPath> {
		let mut targeted = vec![];
		for target in &self.target_data_categories {
			for (category, paths) in collection.field_paths_by_category() {
				if category_matches_prefix(target, &category) {
					targeted.extend(paths);
				}
			}
		}
		targeted
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
	pub key: String,
	pub rules: Vec<Rule>,
}

impl Policy {
	pub fn erasure_rules(&self) -> impl Iterator<Item = &Rule> {
		self.rules.iter().filter(|r| r.action_type == ActionType::Erasure)
	}

	pub fn generates_erasures(&self) -> bool {
		self.erasure_rules().next().is_some()
	}
}

/// Category targeting is a prefix match aligned on dot-separated segments:
/// `user.provided.identifiable.contact` covers
/// `user.provided.identifiable.contact.email` but `user.prov` covers
/// nothing under `user.provided`.
pub fn category_matches_prefix(target: &str, category: &str) -> bool {
	let target_segments: Vec<&str> = target.split('.').collect();
	let category_segments: Vec<&str> = category.split('.').collect();
	category_segments.len() >= target_segments.len()
		&& target_segments.iter().zip(&category_segments).all(|(a, b)| a == b)
}
