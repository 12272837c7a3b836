//! The external dataset definition format. Annotated datasets arrive as JSON
//! or YAML documents; conversion into the model validates every annotation
//! before anything reaches graph construction.

use std::collections::BTreeSet;

use crate::{
	dataset::{
		Collection, CollectionAddress, Dataset, DatasetError, EdgeDirection, Field,
		FieldAddress, FieldPath,
	},
	datatype::DataType,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInput {
	pub fides_key: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub collections: Vec<CollectionInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInput {
	pub name: String,
	pub fields: Vec<FieldInput>,
}

/// A single annotated field. Collections are flat; a `fields` key here is an
/// unknown field and rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldInput {
	pub name: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub data_categories: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fidesops_meta: Option<FieldMetaInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FieldMetaInput {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub length: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub primary_key: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub identity: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub references: Option<Vec<ReferenceInput>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceInput {
	pub dataset: String,
	/// `<collection>.<field path>` within the referenced dataset
	pub field: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub direction: Option<EdgeDirection>,
}

impl DatasetInput {
	pub fn from_json(json: &str) -> Result<Self, DatasetError> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn from_yaml(yaml: &str) -> Result<Self, DatasetError> {
		Ok(serde_yaml::from_str(yaml)?)
	}

	/// Validate the annotations and produce the model. Field ordering within
	/// collections is preserved.
	pub fn into_dataset(self, connection_key: &str) -> Result<Dataset, DatasetError> {
		let mut collections = Vec::with_capacity(self.collections.len());
		for collection in self.collections {
			let mut seen_names: BTreeSet<String> = BTreeSet::new();
			let mut seen_identities: BTreeSet<String> = BTreeSet::new();
			let mut fields = Vec::with_capacity(collection.fields.len());
			for field in collection.fields {
				if !seen_names.insert(field.name.clone()) {
					return Err(DatasetError::DuplicateField {
						collection: collection.name,
						field: field.name,
					});
				}
				let converted = convert_field(field)?;
				if let Some(kind) = &converted.identity {
					if !seen_identities.insert(kind.clone()) {
						return Err(DatasetError::DuplicateIdentity {
							collection: collection.name,
							kind: kind.clone(),
						});
					}
				}
				fields.push(converted);
			}
			collections.push(Collection { name: collection.name, fields });
		}

		Ok(Dataset {
			name: self.name.unwrap_or_else(|| self.fides_key.clone()),
			fides_key: self.fides_key,
			description: self.description,
			collections,
			connection_key: connection_key.to_owned(),
		})
	}

	pub fn from_dataset(dataset: &Dataset) -> Self {
		DatasetInput {
			fides_key: dataset.fides_key.clone(),
			name: Some(dataset.name.clone()),
			description: dataset.description.clone(),
			collections: dataset
				.collections
				.iter()
				.map(|collection| CollectionInput {
					name: collection.name.clone(),
					fields: collection.fields.iter().map(field_to_input).collect(),
				})
				.collect(),
		}
	}
}

fn convert_field(field: FieldInput) -> Result<Field, DatasetError> {
	let mut converted = Field::new(&field.name);
	converted.data_categories = field.data_categories.into_iter().collect();

	if let Some(meta) = field.fidesops_meta {
		if let Some(length) = meta.length {
			if length <= 0 {
				return Err(DatasetError::IllegalLength(length));
			}
			converted.length = Some(length as u32);
		}
		if let Some(name) = meta.data_type {
			converted.data_type = Some(
				DataType::from_name(&name)
					.ok_or(DatasetError::UnsupportedDataType(name))?,
			);
		}
		converted.primary_key = meta.primary_key.unwrap_or(false);
		converted.identity = meta.identity;
		for reference in meta.references.unwrap_or_default() {
			converted.references.push((
				parse_reference_target(&reference.dataset, &reference.field)?,
				reference.direction,
			));
		}
	}

	Ok(converted)
}

fn parse_reference_target(dataset: &str, field: &str) -> Result<FieldAddress, DatasetError> {
	let (collection, path) = field
		.split_once('.')
		.ok_or_else(|| DatasetError::MalformedReference { reference: field.to_owned() })?;
	Ok(CollectionAddress::new(dataset, collection).field_address(FieldPath::parse(path)))
}

fn field_to_input(field: &Field) -> FieldInput {
	let references: Vec<ReferenceInput> = field
		.references
		.iter()
		.map(|(target, direction)| ReferenceInput {
			dataset: target.collection_address.dataset.clone(),
			field: format!("{}.{}", target.collection_address.collection, target.field_path),
			direction: *direction,
		})
		.collect();

	let has_meta = field.data_type.is_some()
		|| field.length.is_some()
		|| field.primary_key
		|| field.identity.is_some()
		|| !references.is_empty();

	FieldInput {
		name: field.name.clone(),
		data_categories: field.data_categories.iter().cloned().collect(),
		fidesops_meta: has_meta.then(|| FieldMetaInput {
			data_type: field.data_type.map(|t| t.name().to_owned()),
			length: field.length.map(i64::from),
			primary_key: field.primary_key.then_some(true),
			identity: field.identity.clone(),
			references: (!references.is_empty()).then_some(references),
		}),
	}
}
