//! Query generation for document stores. A retrieval is a `(filter,
//! projection)` pair; an update is a `(primary key filter, $set document)`
//! pair.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use common::{
    cache::Cache,
    graph::traversal::{Row, TraversalNode},
    policy::Policy,
};

use crate::{query::QueryCore, ConnectorError, NodeInput};

pub type Document = Map<String, Value>;

/// `collection.find(filter, projection)` operands
pub type DocumentStatement = (Document, Document);

pub struct DocumentQueryConfig<'a> {
    core: QueryCore<'a>,
}

impl<'a> DocumentQueryConfig<'a> {
    pub fn new(node: &'a TraversalNode) -> Self {
        DocumentQueryConfig { core: QueryCore::new(node) }
    }

    fn projection(&self) -> Document {
        self.core
            .field_map()
            .keys()
            .map(|path| (path.string_path(), Value::from(1)))
            .collect()
    }

    /// Generate a retrieval filter and projection, or None when no input
    /// survives filtering
    pub fn generate_query(&self, input: &NodeInput) -> Option<DocumentStatement> {
        let filtered = self.core.typed_filtered_values(input);
        if filtered.is_empty() {
            warn!(
                address = %self.core.address(),
                "There is not enough data to generate a valid query"
            );
            return None;
        }

        let mut pairs = Document::new();
        for (key, values) in filtered {
            if values.len() == 1 {
                pairs.insert(key, values.into_iter().next().unwrap());
            } else {
                pairs.insert(key, serde_json::json!({ "$in": values }));
            }
        }

        Some((or_of_single_keys(pairs), self.projection()))
    }

    /// Generate update operands masking the row per the policy, or None
    /// when there is nothing to update or no primary key to anchor it
    pub async fn generate_update_stmt(
        &self,
        row: &Row,
        policy: &Policy,
        request_id: &str,
        cache: Arc<dyn Cache>,
    ) -> Result<Option<DocumentStatement>, ConnectorError> {
        let update_value_map = self.core.update_value_map(row, policy, request_id, cache).await?;
        let pk_filter: Document = self.core.non_empty_primary_keys(row).into_iter().collect();

        if update_value_map.is_empty() || pk_filter.is_empty() {
            warn!(
                address = %self.core.address(),
                "There is not enough data to generate a valid update"
            );
            return Ok(None);
        }

        let set_document: Document =
            [("$set".to_string(), Value::Object(update_value_map.into_iter().collect()))]
                .into_iter()
                .collect();
        Ok(Some((pk_filter, set_document)))
    }

    /// String representation of a find, for logging and dry runs
    pub fn query_to_string(&self, statement: &DocumentStatement) -> String {
        let (filter, projection) = statement;
        format!(
            "db.{}.{}.find({}, {})",
            self.core.address().dataset,
            self.core.address().collection,
            Value::Object(filter.clone()),
            Value::Object(projection.clone()),
        )
    }

    pub fn dry_run_query(&self) -> Option<String> {
        let sources = self.core.query_sources();
        if sources.is_empty() {
            warn!(
                address = %self.core.address(),
                "There is not enough data to generate a valid query"
            );
            return None;
        }

        let mut pairs = Document::new();
        for (key, addresses) in sources {
            let singular = addresses.len() == 1 && addresses[0].is_root();
            if singular {
                pairs.insert(key, Value::String("?".to_string()));
            } else {
                pairs.insert(key, serde_json::json!({ "$in": ["?", "?"] }));
            }
        }
        Some(self.query_to_string(&(or_of_single_keys(pairs), self.projection())))
    }
}

/// A multi-key filter matches on any key: `{A:1, B:2}` becomes
/// `{$or: [{A:1}, {B:2}]}`. Single-key filters stay flat.
fn or_of_single_keys(pairs: Document) -> Document {
    if pairs.len() < 2 {
        return pairs;
    }
    let alternatives: Vec<Value> = pairs
        .into_iter()
        .map(|(k, v)| Value::Object([(k, v)].into_iter().collect()))
        .collect();
    [("$or".to_string(), Value::Array(alternatives))].into_iter().collect()
}
