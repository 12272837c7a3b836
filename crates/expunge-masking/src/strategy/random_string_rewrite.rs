use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use common::cache::Cache;

use crate::{MaskingError, MaskingSecretMeta, MaskingStrategy, RANDOM_STRING_REWRITE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomStringRewriteMaskingConfiguration {
    #[serde(default = "RandomStringRewriteMaskingConfiguration::default_length")]
    pub length: usize,
}

impl RandomStringRewriteMaskingConfiguration {
    fn default_length() -> usize {
        30
    }
}

impl Default for RandomStringRewriteMaskingConfiguration {
    fn default() -> Self {
        Self { length: Self::default_length() }
    }
}

/// Replaces every value with a fresh random string of the configured length
pub struct RandomStringRewriteMaskingStrategy {
    length: usize,
}

impl RandomStringRewriteMaskingStrategy {
    pub fn new(configuration: RandomStringRewriteMaskingConfiguration) -> Self {
        Self { length: configuration.length }
    }

    pub fn from_configuration(
        configuration: &Value,
        _cache: Arc<dyn Cache>,
    ) -> Result<Box<dyn MaskingStrategy>, MaskingError> {
        let configuration = if configuration.is_null() {
            RandomStringRewriteMaskingConfiguration::default()
        } else {
            serde_json::from_value(configuration.clone()).map_err(|source| {
                MaskingError::Configuration {
                    strategy: RANDOM_STRING_REWRITE.to_owned(),
                    source,
                }
            })?
        };
        Ok(Box::new(Self::new(configuration)))
    }
}

#[async_trait::async_trait]
impl MaskingStrategy for RandomStringRewriteMaskingStrategy {
    fn name(&self) -> &'static str {
        RANDOM_STRING_REWRITE
    }

    async fn mask(
        &self,
        value: Option<&Value>,
        _request_id: Option<&str>,
    ) -> Result<Value, MaskingError> {
        match value {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(_) => {
                let masked: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(self.length)
                    .map(char::from)
                    .collect();
                Ok(Value::String(masked))
            }
        }
    }

    fn data_type_supported(&self, data_type: &str) -> bool {
        data_type == "string"
    }

    fn secret_meta(&self) -> Vec<MaskingSecretMeta> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn rewrites_to_a_random_string_of_the_configured_length() {
        let masker = RandomStringRewriteMaskingStrategy::new(
            RandomStringRewriteMaskingConfiguration { length: 12 },
        );
        let masked = masker.mask(Some(&json!("monkey")), None).await.unwrap();
        assert_eq!(masked.as_str().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn default_length_is_thirty() {
        let masker = RandomStringRewriteMaskingStrategy::new(
            RandomStringRewriteMaskingConfiguration::default(),
        );
        let masked = masker.mask(Some(&json!("monkey")), None).await.unwrap();
        assert_eq!(masked.as_str().unwrap().len(), 30);
    }
}
