//! Logic shared by every dialect: input filtering and casting, rule
//! targeting, and masked value map construction.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde_json::Value;
use tracing::{debug, warn};

use common::{
    cache::Cache,
    dataset::{CollectionAddress, Field, FieldPath},
    graph::traversal::{Row, TraversalNode},
    policy::{Policy, Rule},
};
use expunge_masking::{get_strategy, MaskingStrategy, NULL_REWRITE};

use crate::{ConnectorError, NodeInput};

pub mod document;
pub mod sql;

/// Dialect-independent view over one traversal node
pub struct QueryCore<'a> {
    pub node: &'a TraversalNode,
}

impl<'a> QueryCore<'a> {
    pub fn new(node: &'a TraversalNode) -> Self {
        QueryCore { node }
    }

    pub fn address(&self) -> &CollectionAddress {
        &self.node.address
    }

    /// Flattened field paths of interest on this node
    pub fn field_map(&self) -> BTreeMap<FieldPath, &'a Field> {
        self.node.collection.field_dict()
    }

    pub fn query_field_paths(&self) -> BTreeSet<FieldPath> {
        self.node.query_field_paths()
    }

    pub fn primary_key_field_paths(&self) -> BTreeMap<FieldPath, &'a Field> {
        self.field_map().into_iter().filter(|(_, field)| field.primary_key).collect()
    }

    /// Keep only input keys that are the ends of incoming edges, casting
    /// values through the declared field types and dropping anything that
    /// does not survive the cast
    pub fn typed_filtered_values(&self, input: &NodeInput) -> NodeInput {
        let query_paths = self.query_field_paths();
        let mut out = NodeInput::new();
        for (key, values) in input {
            let path = FieldPath::parse(key);
            if !query_paths.contains(&path) {
                continue;
            }
            let field = match self.node.collection.field(&path) {
                Some(field) => field,
                None => continue,
            };
            let cast: Vec<Value> = values.iter().filter_map(|v| field.cast(v)).collect();
            if !cast.is_empty() {
                out.insert(key.clone(), cast);
            }
        }
        out
    }

    /// The input collections feeding each query key, for dry-run display
    pub fn query_sources(&self) -> BTreeMap<String, Vec<CollectionAddress>> {
        let mut sources: BTreeMap<String, Vec<CollectionAddress>> = BTreeMap::new();
        for edge in &self.node.incoming_edges {
            sources
                .entry(edge.to.field_path.string_path())
                .or_default()
                .push(edge.from.collection_address.clone());
        }
        sources
    }

    /// Erasure rules mapped to the field paths they target on this
    /// collection
    pub fn rule_target_field_paths<'p>(
        &self,
        policy: &'p Policy,
    ) -> Vec<(&'p Rule, Vec<FieldPath>)> {
        policy
            .erasure_rules()
            .filter(|rule| !rule.target_data_categories.is_empty())
            .map(|rule| (rule, rule.targeted_field_paths(&self.node.collection)))
            .collect()
    }

    /// Primary key predicates present on the row with non-nil cast values
    pub fn non_empty_primary_keys(&self, row: &Row) -> BTreeMap<String, Value> {
        self.primary_key_field_paths()
            .into_iter()
            .filter_map(|(path, field)| {
                let key = path.string_path();
                row.get(&key).and_then(|v| field.cast(v)).map(|v| (key, v))
            })
            .collect()
    }

    /// Map the field paths targeted by the policy to their masked values
    /// for one row. Fields whose data type the strategy cannot mask are
    /// skipped with a warning; declared lengths truncate the masked output
    /// except under the null rewrite.
    pub async fn update_value_map(
        &self,
        row: &Row,
        policy: &Policy,
        request_id: &str,
        cache: Arc<dyn Cache>,
    ) -> Result<BTreeMap<String, Value>, ConnectorError> {
        let field_map = self.field_map();
        let mut value_map: BTreeMap<String, Value> = BTreeMap::new();

        for (rule, field_paths) in self.rule_target_field_paths(policy) {
            let strategy_config = match &rule.masking_strategy {
                Some(config) => config,
                None => continue,
            };
            let strategy = get_strategy(
                &strategy_config.strategy,
                &strategy_config.configuration,
                cache.clone(),
            )?;
            let null_masking = strategy_config.strategy == NULL_REWRITE;

            for path in field_paths {
                let field = match field_map.get(&path) {
                    Some(field) => *field,
                    None => continue,
                };
                if !supported_data_type(field, null_masking, strategy.as_ref()) {
                    warn!(
                        field = %path,
                        strategy = %strategy_config.strategy,
                        "Unable to generate an update for field: data_type is either not \
                         present on the field or not supported for the masking strategy"
                    );
                    continue;
                }
                let value = row.get(&path.string_path());
                let mut masked = strategy.mask(value, Some(request_id)).await?;
                debug!(field = %path, "Generated masked value");
                if !null_masking {
                    if let (Some(length), Some(data_type)) = (field.length, field.data_type) {
                        masked = data_type.truncate(length as usize, masked);
                    }
                }
                value_map.insert(path.string_path(), masked);
            }
        }

        Ok(value_map)
    }
}

fn supported_data_type(field: &Field, null_masking: bool, strategy: &dyn MaskingStrategy) -> bool {
    if null_masking {
        return true;
    }
    match &field.data_type {
        None => false,
        Some(data_type) => strategy.data_type_supported(data_type.name()),
    }
}

/// Collapse duplicate filter values, preserving first-seen order
pub(crate) fn distinct_values(values: &[Value]) -> Vec<Value> {
    let mut distinct: Vec<Value> = vec![];
    for value in values {
        if !distinct.contains(value) {
            distinct.push(value.clone());
        }
    }
    distinct
}
