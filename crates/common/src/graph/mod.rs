use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::dataset::{
	Collection, CollectionAddress, Dataset, EdgeDirection, Field, FieldAddress, FieldPath,
};

pub mod traversal;

#[derive(Error, Debug)]
pub enum GraphError {
	#[error("Referred to object {0} does not exist")]
	MissingReference(FieldAddress),

	#[error("Collection {0} references itself")]
	SelfReference(CollectionAddress),

	#[error("Duplicate collection address {0}")]
	DuplicateAddress(CollectionAddress),
}

/// Directed edge: values observed at `from` can be used to filter `to`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
	pub from: FieldAddress,
	pub to: FieldAddress,
}

impl Edge {
	pub fn new(from: FieldAddress, to: FieldAddress) -> Self {
		Edge { from, to }
	}
}

impl core::fmt::Display for Edge {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "{} -> {}", self.from, self.to)
	}
}

/// A collection bound to its address and owning connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
	pub address: CollectionAddress,
	pub connection_key: String,
	pub collection: Collection,
}

/// The multi-DAG of annotated collections. A synthetic root collection holds
/// one field per identity kind supplied with the request and is the sole
/// source for identity edges.
#[derive(Debug, Clone)]
pub struct DatasetGraph {
	pub nodes: BTreeMap<CollectionAddress, Node>,
	pub edges: BTreeSet<Edge>,
	pub root: Node,
}

impl DatasetGraph {
	pub fn new(
		datasets: &[Dataset],
		identity_kinds: &BTreeSet<String>,
	) -> Result<Self, GraphError> {
		let mut nodes: BTreeMap<CollectionAddress, Node> = BTreeMap::new();
		for dataset in datasets {
			for collection in &dataset.collections {
				let address = dataset.collection_address(collection);
				if nodes.contains_key(&address) {
					return Err(GraphError::DuplicateAddress(address));
				}
				nodes.insert(
					address.clone(),
					Node {
						address,
						connection_key: dataset.connection_key.clone(),
						collection: collection.clone(),
					},
				);
			}
		}

		let root_address = CollectionAddress::root();
		let root = Node {
			address: root_address.clone(),
			connection_key: String::new(),
			collection: Collection::new(
				crate::dataset::ROOT_COLLECTION_NAME,
				identity_kinds
					.iter()
					.map(|kind| Field { identity: Some(kind.clone()), ..Field::new(kind) })
					.collect(),
			),
		};

		let mut edges: BTreeSet<Edge> = BTreeSet::new();

		// Identity edges: root.k -> every field tagged with a supplied kind
		for node in nodes.values() {
			for (path, kind) in node.collection.identity_paths() {
				if identity_kinds.contains(kind) {
					edges.insert(Edge::new(
						root_address.field_address(FieldPath::parse(kind)),
						node.address.field_address(path),
					));
				}
			}
		}

		// Reference edges, expanding unspecified directions into both
		for node in nodes.values() {
			for (path, field) in node.collection.field_dict() {
				let this = node.address.field_address(path);
				for (target, direction) in &field.references {
					if target.collection_address == node.address {
						return Err(GraphError::SelfReference(node.address.clone()));
					}
					let resolved = nodes
						.get(&target.collection_address)
						.and_then(|n| n.collection.field(&target.field_path));
					if resolved.is_none() {
						return Err(GraphError::MissingReference(target.clone()));
					}
					match direction {
						Some(EdgeDirection::From) => {
							edges.insert(Edge::new(target.clone(), this.clone()));
						},
						Some(EdgeDirection::To) => {
							edges.insert(Edge::new(this.clone(), target.clone()));
						},
						None => {
							edges.insert(Edge::new(target.clone(), this.clone()));
							edges.insert(Edge::new(this.clone(), target.clone()));
						},
					}
				}
			}
		}

		Ok(DatasetGraph { nodes, edges, root })
	}

	/// Field-level edges arriving at the given collection
	pub fn edges_into(&self, address: &CollectionAddress) -> Vec<&Edge> {
		self.edges.iter().filter(|e| &e.to.collection_address == address).collect()
	}

	pub fn edges_out_of(&self, address: &CollectionAddress) -> Vec<&Edge> {
		self.edges.iter().filter(|e| &e.from.collection_address == address).collect()
	}
}
