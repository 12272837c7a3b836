use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;

use crate::datatype::DataType;

pub mod input;

#[derive(Error, Debug)]
pub enum DatasetError {
	#[error("Illegal length ({0}). Only positive non-zero values are allowed.")]
	IllegalLength(i64),

	#[error("The data type {0} is not supported.")]
	UnsupportedDataType(String),

	#[error("Duplicate field {field} in collection {collection}")]
	DuplicateField { collection: String, field: String },

	#[error("Collection {collection} has more than one field tagged with identity {kind}")]
	DuplicateIdentity { collection: String, kind: String },

	#[error("Malformed reference {reference}: expected <collection>.<field>")]
	MalformedReference { reference: String },

	#[error("Dataset definition not readable: {0}")]
	DefinitionNotReadable(
		#[from]
		#[source]
		std::io::Error,
	),

	#[error("Dataset definition invalid JSON: {0}")]
	DefinitionInvalidJson(
		#[from]
		#[source]
		serde_json::Error,
	),

	#[error("Dataset definition invalid YAML: {0}")]
	DefinitionInvalidYaml(
		#[from]
		#[source]
		serde_yaml::Error,
	),
}

/// An ordered sequence of name levels locating a (possibly nested) leaf
/// inside a flat collection. Nesting is expressed with dots; a collection
/// never nests fields structurally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
	pub fn new<I, S>(levels: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		FieldPath(levels.into_iter().map(|l| l.as_ref().to_owned()).collect())
	}

	pub fn parse(path: &str) -> Self {
		FieldPath(path.split('.').map(str::to_owned).collect())
	}

	pub fn levels(&self) -> &[String] {
		&self.0
	}

	/// The final level, the only one SQL projection can address
	pub fn last_level(&self) -> &str {
		self.0.last().map(String::as_str).unwrap_or("")
	}

	pub fn string_path(&self) -> String {
		self.0.join(".")
	}
}

impl core::fmt::Display for FieldPath {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "{}", self.string_path())
	}
}

/// `(dataset_key, collection_name)` pair identifying a node. The
/// distinguished root address stands in for the identity source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionAddress {
	pub dataset: String,
	pub collection: String,
}

pub const ROOT_COLLECTION_NAME: &str = "__ROOT__";

impl CollectionAddress {
	pub fn new(dataset: impl AsRef<str>, collection: impl AsRef<str>) -> Self {
		CollectionAddress {
			dataset: dataset.as_ref().to_owned(),
			collection: collection.as_ref().to_owned(),
		}
	}

	pub fn root() -> Self {
		CollectionAddress::new(ROOT_COLLECTION_NAME, ROOT_COLLECTION_NAME)
	}

	pub fn is_root(&self) -> bool {
		self.dataset == ROOT_COLLECTION_NAME && self.collection == ROOT_COLLECTION_NAME
	}

	pub fn field_address(&self, path: FieldPath) -> FieldAddress {
		FieldAddress { collection_address: self.clone(), field_path: path }
	}
}

impl core::fmt::Display for CollectionAddress {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "{}:{}", self.dataset, self.collection)
	}
}

/// A fully qualified field: `(dataset, collection, field path)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldAddress {
	pub collection_address: CollectionAddress,
	pub field_path: FieldPath,
}

impl core::fmt::Display for FieldAddress {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "{}:{}", self.collection_address, self.field_path)
	}
}

/// Direction of a cross-dataset reference. `From` means values flow from the
/// remote field into this one; `To` the reverse. An unspecified direction is
/// treated as bidirectional and expands to two directed edges at graph
/// construction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
	From,
	To,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
	pub name: String,
	pub data_type: Option<DataType>,
	pub length: Option<u32>,
	pub primary_key: bool,
	pub data_categories: BTreeSet<String>,
	pub references: Vec<(FieldAddress, Option<EdgeDirection>)>,
	pub identity: Option<String>,
}

impl Field {
	pub fn new(name: impl AsRef<str>) -> Self {
		Field {
			name: name.as_ref().to_owned(),
			data_type: None,
			length: None,
			primary_key: false,
			data_categories: BTreeSet::new(),
			references: vec![],
			identity: None,
		}
	}

	/// Coerce a filter value through the declared data type. Fields without
	/// a declared type pass values through untouched; nulls never survive a
	/// cast
	pub fn cast(&self, value: &Value) -> Option<Value> {
		if value.is_null() {
			return None;
		}
		match &self.data_type {
			Some(ty) => ty.cast(value),
			None => Some(value.clone()),
		}
	}

	pub fn path(&self) -> FieldPath {
		FieldPath::parse(&self.name)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
	pub name: String,
	pub fields: Vec<Field>,
}

impl Collection {
	pub fn new(name: impl AsRef<str>, fields: Vec<Field>) -> Self {
		Collection { name: name.as_ref().to_owned(), fields }
	}

	pub fn field(&self, path: &FieldPath) -> Option<&Field> {
		self.fields.iter().find(|f| &f.path() == path)
	}

	/// Flattened map of every field path in declaration order
	pub fn field_dict(&self) -> BTreeMap<FieldPath, &Field> {
		self.fields.iter().map(|f| (f.path(), f)).collect()
	}

	pub fn field_paths_by_category(&self) -> BTreeMap<String, Vec<FieldPath>> {
		let mut by_category: BTreeMap<String, Vec<FieldPath>> = BTreeMap::new();
		for field in &self.fields {
			for category in &field.data_categories {
				by_category.entry(category.clone()).or_default().push(field.path());
			}
		}
		by_category
	}

	pub fn identity_paths(&self) -> Vec<(FieldPath, &str)> {
		self.fields
			.iter()
			.filter_map(|f| f.identity.as_deref().map(|kind| (f.path(), kind)))
			.collect()
	}

	pub fn primary_key_paths(&self) -> Vec<FieldPath> {
		self.fields.iter().filter(|f| f.primary_key).map(Field::path).collect()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
	pub fides_key: String,
	pub name: String,
	pub description: Option<String>,
	pub collections: Vec<Collection>,
	pub connection_key: String,
}

impl Dataset {
	pub fn collection(&self, name: &str) -> Option<&Collection> {
		self.collections.iter().find(|c| c.name == name)
	}

	pub fn collection_address(&self, collection: &Collection) -> CollectionAddress {
		CollectionAddress::new(&self.fides_key, &collection.name)
	}
}
