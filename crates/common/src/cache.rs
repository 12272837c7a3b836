use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum CacheError {
	#[error("Cache serialization: {0}")]
	Serialization(
		#[from]
		#[source]
		serde_json::Error,
	),

	#[error("Cache unavailable: {0}")]
	Unavailable(String),
}

/// The shared key-value cache. Identity values, masking secrets and
/// intermediate per-node results all live here, namespaced by request id;
/// entries expire with the request. Concrete backends own their own
/// concurrency.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
	async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

	async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

	async fn delete(&self, key: &str) -> Result<(), CacheError>;

	async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

/// Process-local cache, used in devmode and throughout the test suites
#[derive(Debug, Default)]
pub struct InMemoryCache {
	entries: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryCache {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl Cache for InMemoryCache {
	async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
		self.entries.write().await.insert(key.to_owned(), value);
		Ok(())
	}

	async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
		Ok(self.entries.read().await.get(key).cloned())
	}

	async fn delete(&self, key: &str) -> Result<(), CacheError> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
		Ok(self
			.entries
			.read()
			.await
			.keys()
			.filter(|k| k.starts_with(prefix))
			.cloned()
			.collect())
	}
}
