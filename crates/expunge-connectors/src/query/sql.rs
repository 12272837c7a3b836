//! Retrieval and update statement generation for the SQL dialects.
//!
//! Dialects are tagged variants over one generator rather than a type
//! hierarchy; the differences are quoting and how tuple parameters bind.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use tracing::warn;

use common::{
    cache::Cache,
    dataset::FieldPath,
    graph::traversal::{Row, TraversalNode},
    policy::Policy,
};

use crate::{
    query::{distinct_values, QueryCore},
    ConnectorError, NodeInput,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SqlDialect {
    Generic,
    Snowflake,
    Redshift,
    MicrosoftSql,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Single(Value),
    Tuple(Vec<Value>),
}

/// A parameterised statement: text with `:name` placeholders plus the bound
/// values
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: BTreeMap<String, SqlParam>,
}

impl SqlDialect {
    /// Projection for one field. Only the last path level is addressable;
    /// nested SQL projection is not supported.
    fn format_field(&self, path: &FieldPath) -> String {
        match self {
            SqlDialect::Snowflake => format!("\"{}\"", path.last_level()),
            _ => path.last_level().to_owned(),
        }
    }

    fn format_clause(&self, column: &str, operator: &str, operand: &str) -> String {
        match self {
            SqlDialect::Snowflake => format!("\"{column}\" {operator} ({operand})"),
            SqlDialect::MicrosoftSql if operator == "IN" =>
                format!("{column} IN ({operand})"),
            _ => format!("{column} {operator} {operand}"),
        }
    }

    fn format_query(&self, collection: &str, field_list: &str, clauses: &[String]) -> String {
        match self {
            SqlDialect::Snowflake | SqlDialect::Redshift => format!(
                "SELECT {field_list} FROM \"{collection}\" WHERE {}",
                clauses.join(" OR ")
            ),
            _ => format!(
                "SELECT {field_list} FROM {collection} WHERE {}",
                clauses.join(" OR ")
            ),
        }
    }

    fn format_assignment(&self, column: &str) -> String {
        match self {
            SqlDialect::Snowflake => format!("\"{column}\" = :{column}"),
            _ => format!("{column} = :{column}"),
        }
    }

    fn format_update(
        &self,
        collection: &str,
        update_clauses: &[String],
        pk_clauses: &[String],
    ) -> String {
        match self {
            SqlDialect::Snowflake => format!(
                "UPDATE \"{collection}\" SET {} WHERE {}",
                update_clauses.join(","),
                pk_clauses.join(" AND ")
            ),
            _ => format!(
                "UPDATE {collection} SET {} WHERE {}",
                update_clauses.join(","),
                pk_clauses.join(" AND ")
            ),
        }
    }
}

pub struct SqlQueryConfig<'a> {
    core: QueryCore<'a>,
    dialect: SqlDialect,
}

impl<'a> SqlQueryConfig<'a> {
    pub fn new(node: &'a TraversalNode, dialect: SqlDialect) -> Self {
        SqlQueryConfig { core: QueryCore::new(node), dialect }
    }

    fn field_list(&self) -> String {
        self.core
            .field_map()
            .keys()
            .map(|path| self.dialect.format_field(path))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Generate a retrieval statement, or None when no input survives
    /// filtering
    pub fn generate_query(&self, input: &NodeInput) -> Option<SqlStatement> {
        let filtered = self.core.typed_filtered_values(input);
        if filtered.is_empty() {
            warn!(
                address = %self.core.address(),
                "There is not enough data to generate a valid query"
            );
            return None;
        }

        let mut clauses: Vec<String> = vec![];
        let mut params: BTreeMap<String, SqlParam> = BTreeMap::new();
        for (key, values) in filtered {
            let distinct = distinct_values(&values);
            if distinct.len() == 1 {
                clauses.push(self.dialect.format_clause(&key, "=", &format!(":{key}")));
                params.insert(key, SqlParam::Single(distinct.into_iter().next().unwrap()));
            } else if self.dialect == SqlDialect::MicrosoftSql {
                // Tuples cannot be bound to IN here; expand into one
                // suffixed parameter per value
                let mut operand_keys: Vec<String> = vec![];
                for (index, value) in distinct.into_iter().enumerate() {
                    let name = format!("{key}_in_stmt_generated_{index}");
                    operand_keys.push(format!(":{name}"));
                    params.insert(name, SqlParam::Single(value));
                }
                clauses.push(self.dialect.format_clause(&key, "IN", &operand_keys.join(", ")));
            } else {
                clauses.push(self.dialect.format_clause(&key, "IN", &format!(":{key}")));
                params.insert(key, SqlParam::Tuple(distinct));
            }
        }

        let text =
            self.dialect.format_query(&self.core.address().collection, &self.field_list(), &clauses);
        Some(SqlStatement { text, params })
    }

    /// Generate an update statement masking the row per the policy, or None
    /// when there is nothing to update or no primary key to anchor it
    pub async fn generate_update_stmt(
        &self,
        row: &Row,
        policy: &Policy,
        request_id: &str,
        cache: Arc<dyn Cache>,
    ) -> Result<Option<SqlStatement>, ConnectorError> {
        let update_value_map = self.core.update_value_map(row, policy, request_id, cache).await?;
        let update_clauses: Vec<String> =
            update_value_map.keys().map(|k| self.dialect.format_assignment(k)).collect();

        let non_empty_primary_keys = self.core.non_empty_primary_keys(row);
        let pk_clauses: Vec<String> =
            non_empty_primary_keys.keys().map(|k| self.dialect.format_assignment(k)).collect();

        if update_clauses.is_empty() || pk_clauses.is_empty() {
            warn!(
                address = %self.core.address(),
                "There is not enough data to generate a valid update statement"
            );
            return Ok(None);
        }

        let mut params: BTreeMap<String, SqlParam> = update_value_map
            .into_iter()
            .map(|(k, v)| (k, SqlParam::Single(v)))
            .collect();
        for (k, v) in non_empty_primary_keys {
            params.insert(k, SqlParam::Single(v));
        }

        let text = self.dialect.format_update(
            &self.core.address().collection,
            &update_clauses,
            &pk_clauses,
        );
        Ok(Some(SqlStatement { text, params }))
    }

    /// Render a statement with its parameters inlined, for logging and dry
    /// runs
    pub fn query_to_string(&self, statement: &SqlStatement) -> String {
        let mut text = statement.text.clone();
        // Longest first so :email_in_stmt_generated_0 is not clobbered by
        // :email
        let mut keys: Vec<&String> = statement.params.keys().collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
        for key in keys {
            let rendered = match &statement.params[key] {
                SqlParam::Single(value) => render_literal(value),
                SqlParam::Tuple(values) => {
                    let joined =
                        values.iter().map(render_literal).collect::<Vec<_>>().join(", ");
                    match self.dialect {
                        // Snowflake already parenthesises the operand
                        SqlDialect::Snowflake => joined,
                        _ => format!("({joined})"),
                    }
                }
            };
            text = text.replace(&format!(":{key}"), &rendered);
        }
        text
    }

    /// A representative query assuming singular identity inputs and paired
    /// placeholders for everything else
    pub fn dry_run_query(&self) -> Option<String> {
        let sources = self.core.query_sources();
        if sources.is_empty() {
            warn!(
                address = %self.core.address(),
                "There is not enough data to generate a valid query"
            );
            return None;
        }

        let clauses: Vec<String> = sources
            .iter()
            .map(|(key, addresses)| {
                let singular = addresses.len() == 1 && addresses[0].is_root();
                if singular {
                    self.dialect.format_clause(key, "=", "?")
                } else {
                    match self.dialect {
                        SqlDialect::Generic | SqlDialect::Redshift =>
                            self.dialect.format_clause(key, "IN", "(?, ?)"),
                        _ => self.dialect.format_clause(key, "IN", "?, ?"),
                    }
                }
            })
            .collect();

        Some(self.dialect.format_query(
            &self.core.address().collection,
            &self.field_list(),
            &clauses,
        ))
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}
