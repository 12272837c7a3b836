use std::sync::Arc;

use serde_json::Value;

use common::cache::Cache;

use crate::{MaskingError, MaskingSecretMeta, MaskingStrategy, NULL_REWRITE};

/// Replaces every value with null. Supports any data type and, being the
/// null rewrite, bypasses length truncation entirely.
pub struct NullMaskingStrategy;

impl NullMaskingStrategy {
    pub fn from_configuration(
        _configuration: &Value,
        _cache: Arc<dyn Cache>,
    ) -> Result<Box<dyn MaskingStrategy>, MaskingError> {
        Ok(Box::new(NullMaskingStrategy))
    }
}

#[async_trait::async_trait]
impl MaskingStrategy for NullMaskingStrategy {
    fn name(&self) -> &'static str {
        NULL_REWRITE
    }

    async fn mask(
        &self,
        _value: Option<&Value>,
        _request_id: Option<&str>,
    ) -> Result<Value, MaskingError> {
        Ok(Value::Null)
    }

    fn data_type_supported(&self, _data_type: &str) -> bool {
        true
    }

    fn secret_meta(&self) -> Vec<MaskingSecretMeta> {
        vec![]
    }
}
