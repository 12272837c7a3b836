use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::cache::Cache;

use crate::{MaskingError, MaskingSecretMeta, MaskingStrategy, STRING_REWRITE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRewriteMaskingConfiguration {
    pub rewrite_value: String,
}

/// Replaces every value with a fixed configured string
pub struct StringRewriteMaskingStrategy {
    rewrite_value: String,
}

impl StringRewriteMaskingStrategy {
    pub fn new(configuration: StringRewriteMaskingConfiguration) -> Self {
        Self { rewrite_value: configuration.rewrite_value }
    }

    pub fn from_configuration(
        configuration: &Value,
        _cache: Arc<dyn Cache>,
    ) -> Result<Box<dyn MaskingStrategy>, MaskingError> {
        let configuration = serde_json::from_value(configuration.clone()).map_err(|source| {
            MaskingError::Configuration { strategy: STRING_REWRITE.to_owned(), source }
        })?;
        Ok(Box::new(Self::new(configuration)))
    }
}

#[async_trait::async_trait]
impl MaskingStrategy for StringRewriteMaskingStrategy {
    fn name(&self) -> &'static str {
        STRING_REWRITE
    }

    async fn mask(
        &self,
        value: Option<&Value>,
        _request_id: Option<&str>,
    ) -> Result<Value, MaskingError> {
        match value {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(_) => Ok(Value::String(self.rewrite_value.clone())),
        }
    }

    fn data_type_supported(&self, data_type: &str) -> bool {
        data_type == "string"
    }

    fn secret_meta(&self) -> Vec<MaskingSecretMeta> {
        vec![]
    }
}
