#![cfg_attr(feature = "strict", deny(warnings))]
//! Pluggable masking strategies with per-request secret management.
//!
//! Strategies are looked up by name in a registry populated at startup; a
//! rule selects one by name plus a configuration document. Strategies that
//! need secrets read them from the shared cache, where the request runner
//! placed them before execution began.

use std::{collections::BTreeMap, sync::Arc};

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use common::{
    cache::{Cache, CacheError},
    request::masking_secret_cache_key,
};

pub mod strategy;

pub use strategy::{
    hash::HashMaskingStrategy, nullify::NullMaskingStrategy,
    random_string_rewrite::RandomStringRewriteMaskingStrategy,
    string_rewrite::StringRewriteMaskingStrategy,
};

pub static HASH: &str = "hash";
pub static NULL_REWRITE: &str = "null_rewrite";
pub static STRING_REWRITE: &str = "string_rewrite";
pub static RANDOM_STRING_REWRITE: &str = "random_string_rewrite";

#[derive(Error, Debug)]
pub enum MaskingError {
    #[error("No masking strategy named {0} is registered")]
    UnknownStrategy(String),

    #[error("Invalid configuration for masking strategy {strategy}: {source}")]
    Configuration {
        strategy: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Secret {secret_type} expected from cache but was not present for masking strategy {strategy}"
    )]
    MissingSecret {
        strategy: String,
        secret_type: SecretType,
    },

    #[error("Cache: {0}")]
    Cache(
        #[from]
        #[source]
        CacheError,
    ),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    Salt,
    Key,
}

impl core::fmt::Display for SecretType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SecretType::Salt => write!(f, "salt"),
            SecretType::Key => write!(f, "key"),
        }
    }
}

/// What a strategy needs generated for it before masking begins
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaskingSecretMeta {
    pub masking_strategy: &'static str,
    pub secret_type: SecretType,
    pub secret_length: usize,
}

/// A generated secret, keyed in the cache under
/// `(request_id, strategy, secret_type)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingSecret {
    pub secret: String,
    pub masking_strategy: String,
    pub secret_type: SecretType,
}

/// A single-value transform with access to per-request secrets
#[async_trait::async_trait]
pub trait MaskingStrategy: Send + Sync {
    /// The registry name this strategy was looked up under
    fn name(&self) -> &'static str;

    /// Mask one value. A `None` request id is the standalone masking case
    /// and generates any needed secrets on the fly.
    async fn mask(
        &self,
        value: Option<&Value>,
        request_id: Option<&str>,
    ) -> Result<Value, MaskingError>;

    fn data_type_supported(&self, data_type: &str) -> bool;

    /// Secret kinds the runner must generate and cache for this strategy
    fn secret_meta(&self) -> Vec<MaskingSecretMeta>;
}

type StrategyFactory =
    fn(&Value, Arc<dyn Cache>) -> Result<Box<dyn MaskingStrategy>, MaskingError>;

lazy_static::lazy_static! {
    static ref STRATEGY_REGISTRY: BTreeMap<&'static str, StrategyFactory> = {
        let mut registry: BTreeMap<&'static str, StrategyFactory> = BTreeMap::new();
        registry.insert(HASH, HashMaskingStrategy::from_configuration);
        registry.insert(NULL_REWRITE, NullMaskingStrategy::from_configuration);
        registry.insert(STRING_REWRITE, StringRewriteMaskingStrategy::from_configuration);
        registry.insert(
            RANDOM_STRING_REWRITE,
            RandomStringRewriteMaskingStrategy::from_configuration,
        );
        registry
    };
}

/// Resolve a strategy by registry name and configuration document
pub fn get_strategy(
    name: &str,
    configuration: &Value,
    cache: Arc<dyn Cache>,
) -> Result<Box<dyn MaskingStrategy>, MaskingError> {
    let factory = STRATEGY_REGISTRY
        .get(name)
        .ok_or_else(|| MaskingError::UnknownStrategy(name.to_owned()))?;
    factory(configuration, cache)
}

pub fn registered_strategies() -> Vec<&'static str> {
    STRATEGY_REGISTRY.keys().copied().collect()
}

/// URL-safe random string of roughly `length` bytes of entropy
pub fn generate_secret_string(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Fetch a strategy secret for a request, or generate one for standalone
/// masking. A secret expected from the cache but absent fails the mask
/// rather than degrading to nondeterministic output.
pub async fn get_or_generate_secret(
    cache: &dyn Cache,
    request_id: Option<&str>,
    meta: &MaskingSecretMeta,
) -> Result<String, MaskingError> {
    match request_id {
        Some(request_id) => {
            let key = masking_secret_cache_key(
                request_id,
                meta.masking_strategy,
                &meta.secret_type.to_string(),
            );
            match cache.get(&key).await? {
                Some(Value::String(secret)) => Ok(secret),
                _ => {
                    tracing::warn!(
                        strategy = meta.masking_strategy,
                        secret_type = %meta.secret_type,
                        "Expected masking secret missing from cache"
                    );
                    Err(MaskingError::MissingSecret {
                        strategy: meta.masking_strategy.to_owned(),
                        secret_type: meta.secret_type,
                    })
                }
            }
        }
        None => Ok(generate_secret_string(meta.secret_length)),
    }
}

/// Generate every secret a set of strategies will need
pub fn build_masking_secrets(metas: &[MaskingSecretMeta]) -> Vec<MaskingSecret> {
    metas
        .iter()
        .map(|meta| MaskingSecret {
            secret: generate_secret_string(meta.secret_length),
            masking_strategy: meta.masking_strategy.to_owned(),
            secret_type: meta.secret_type,
        })
        .collect()
}

/// Write generated secrets to the cache under the request's namespace.
/// Performed once per request before any masking runs.
pub async fn cache_masking_secrets(
    cache: &dyn Cache,
    request_id: &str,
    secrets: &[MaskingSecret],
) -> Result<(), MaskingError> {
    for secret in secrets {
        let key = masking_secret_cache_key(
            request_id,
            &secret.masking_strategy,
            &secret.secret_type.to_string(),
        );
        cache.set(&key, Value::String(secret.secret.clone())).await?;
    }
    Ok(())
}
