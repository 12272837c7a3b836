use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};

use common::cache::Cache;

use crate::{
    get_or_generate_secret, MaskingError, MaskingSecretMeta, MaskingStrategy, SecretType, HASH,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-512")]
    Sha512,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMaskingConfiguration {
    #[serde(default = "HashMaskingConfiguration::default_algorithm")]
    pub algorithm: HashAlgorithm,
}

impl HashMaskingConfiguration {
    fn default_algorithm() -> HashAlgorithm {
        HashAlgorithm::Sha256
    }
}

impl Default for HashMaskingConfiguration {
    fn default() -> Self {
        Self { algorithm: Self::default_algorithm() }
    }
}

/// Masks by hashing the value together with a per-request salt. The digest
/// is hex encoded.
pub struct HashMaskingStrategy {
    algorithm: HashAlgorithm,
    cache: Arc<dyn Cache>,
}

impl HashMaskingStrategy {
    pub fn new(configuration: HashMaskingConfiguration, cache: Arc<dyn Cache>) -> Self {
        Self { algorithm: configuration.algorithm, cache }
    }

    pub fn from_configuration(
        configuration: &Value,
        cache: Arc<dyn Cache>,
    ) -> Result<Box<dyn MaskingStrategy>, MaskingError> {
        let configuration = if configuration.is_null() {
            HashMaskingConfiguration::default()
        } else {
            serde_json::from_value(configuration.clone()).map_err(|source| {
                MaskingError::Configuration { strategy: HASH.to_owned(), source }
            })?
        };
        Ok(Box::new(Self::new(configuration, cache)))
    }

    fn salt_meta() -> MaskingSecretMeta {
        MaskingSecretMeta {
            masking_strategy: HASH,
            secret_type: SecretType::Salt,
            secret_length: 16,
        }
    }
}

#[async_trait::async_trait]
impl MaskingStrategy for HashMaskingStrategy {
    fn name(&self) -> &'static str {
        HASH
    }

    async fn mask(
        &self,
        value: Option<&Value>,
        request_id: Option<&str>,
    ) -> Result<Value, MaskingError> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Value::Null),
            Some(v) => v,
        };
        let input = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let salt =
            get_or_generate_secret(self.cache.as_ref(), request_id, &Self::salt_meta()).await?;

        let salted = format!("{input}{salt}");
        let digest = match self.algorithm {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(salted.as_bytes())),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(salted.as_bytes())),
        };
        Ok(Value::String(digest))
    }

    fn data_type_supported(&self, data_type: &str) -> bool {
        data_type == "string"
    }

    fn secret_meta(&self) -> Vec<MaskingSecretMeta> {
        vec![Self::salt_meta()]
    }
}
