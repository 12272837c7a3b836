use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::{
	dataset::{Collection, CollectionAddress, FieldPath},
	graph::{DatasetGraph, Edge},
};

/// A retrieved record, keyed by dotted string path
pub type Row = BTreeMap<String, Value>;

#[derive(Error, Debug)]
pub enum TraversalError {
	#[error("Some nodes were not reachable: {}", .addresses.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
	Unreachable { addresses: Vec<CollectionAddress> },
}

/// Traversal validation summary, surfaced by the dataset validation
/// operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalDetails {
	pub is_traversable: bool,
	pub msg: Option<String>,
}

/// A collection scheduled for execution, carrying the edges that feed it
#[derive(Debug, Clone)]
pub struct TraversalNode {
	pub address: CollectionAddress,
	pub connection_key: String,
	pub collection: Collection,
	pub incoming_edges: Vec<Edge>,
	pub outgoing_edges: Vec<Edge>,
}

impl TraversalNode {
	/// Field paths that are the ends of incoming edges; the only paths a
	/// retrieval query may filter on
	pub fn query_field_paths(&self) -> BTreeSet<FieldPath> {
		self.incoming_edges.iter().map(|e| e.to.field_path.clone()).collect()
	}

	pub fn edges_from(&self, address: &CollectionAddress) -> Vec<&Edge> {
		self.incoming_edges
			.iter()
			.filter(|e| &e.from.collection_address == address)
			.collect()
	}

	/// Addresses this node draws inputs from, root included
	pub fn input_addresses(&self) -> BTreeSet<CollectionAddress> {
		self.incoming_edges.iter().map(|e| e.from.collection_address.clone()).collect()
	}
}

/// Topological execution plan over the reachable subset of a graph. An
/// unreachable remainder does not fail planning; callers decide whether a
/// partial plan is acceptable.
#[derive(Debug, Clone)]
pub struct TraversalPlan {
	pub nodes: Vec<TraversalNode>,
	pub unreachable: Vec<CollectionAddress>,
}

impl TraversalPlan {
	pub fn new(graph: &DatasetGraph) -> Self {
		let root = CollectionAddress::root();

		// Collection-level adjacency
		let mut successors: BTreeMap<CollectionAddress, BTreeSet<CollectionAddress>> =
			BTreeMap::new();
		for edge in &graph.edges {
			successors
				.entry(edge.from.collection_address.clone())
				.or_default()
				.insert(edge.to.collection_address.clone());
		}

		let mut reachable: BTreeSet<CollectionAddress> = BTreeSet::new();
		let mut frontier = vec![root.clone()];
		while let Some(address) = frontier.pop() {
			for next in successors.get(&address).into_iter().flatten() {
				if reachable.insert(next.clone()) {
					frontier.push(next.clone());
				}
			}
		}

		let mut unreachable: Vec<CollectionAddress> =
			graph.nodes.keys().filter(|a| !reachable.contains(a)).cloned().collect();

		// Kahn's ordering over the reachable subset. Edges from unreachable
		// nodes cannot produce values and are excluded; the ready set is a
		// BTreeSet so ties resolve by (dataset_key, collection_name)
		// ascending.
		let mut in_degree: BTreeMap<CollectionAddress, usize> = BTreeMap::new();
		let mut dependents: BTreeMap<CollectionAddress, BTreeSet<CollectionAddress>> =
			BTreeMap::new();
		for address in &reachable {
			in_degree.insert(address.clone(), 0);
		}
		for edge in &graph.edges {
			let from = &edge.from.collection_address;
			let to = &edge.to.collection_address;
			if from == to || !reachable.contains(to) {
				continue;
			}
			if !from.is_root() && !reachable.contains(from) {
				continue;
			}
			if dependents.entry(from.clone()).or_default().insert(to.clone()) {
				*in_degree.entry(to.clone()).or_default() += 1;
			}
		}

		let mut ready: BTreeSet<CollectionAddress> = in_degree
			.iter()
			.filter(|(_, degree)| **degree == 0)
			.map(|(address, _)| address.clone())
			.collect();
		// Root edges are satisfied from the start
		for to in dependents.remove(&root).unwrap_or_default() {
			let degree = in_degree.get_mut(&to).expect("reachable node");
			*degree -= 1;
			if *degree == 0 {
				ready.insert(to);
			}
		}

		let mut ordered: Vec<CollectionAddress> = vec![];
		while let Some(address) = ready.iter().next().cloned() {
			ready.remove(&address);
			ordered.push(address.clone());
			for to in dependents.remove(&address).unwrap_or_default() {
				let degree = in_degree.get_mut(&to).expect("reachable node");
				*degree -= 1;
				if *degree == 0 {
					ready.insert(to);
				}
			}
		}

		// A reachable node the ordering never emitted sits on a cycle, so
		// not every input can be produced before consumption. It is not
		// traversable and must not be dropped silently.
		let emitted: BTreeSet<CollectionAddress> = ordered.iter().cloned().collect();
		for address in &reachable {
			if !emitted.contains(address) {
				unreachable.push(address.clone());
			}
		}
		unreachable.sort();
		if !unreachable.is_empty() {
			warn!(?unreachable, "Nodes not traversable from the identity root");
		}

		let nodes = ordered
			.into_iter()
			.map(|address| {
				let node = &graph.nodes[&address];
				TraversalNode {
					incoming_edges: graph
						.edges_into(&address)
						.into_iter()
						.filter(|e| {
							let from = &e.from.collection_address;
							from.is_root() || emitted.contains(from)
						})
						.cloned()
						.collect(),
					outgoing_edges: graph.edges_out_of(&address).into_iter().cloned().collect(),
					address,
					connection_key: node.connection_key.clone(),
					collection: node.collection.clone(),
				}
			})
			.collect();

		TraversalPlan { nodes, unreachable }
	}

	pub fn is_traversable(&self) -> bool {
		self.unreachable.is_empty()
	}

	pub fn require_complete(&self) -> Result<(), TraversalError> {
		if self.unreachable.is_empty() {
			Ok(())
		} else {
			Err(TraversalError::Unreachable { addresses: self.unreachable.clone() })
		}
	}

	pub fn details(&self) -> TraversalDetails {
		TraversalDetails {
			is_traversable: self.unreachable.is_empty(),
			msg: self.require_complete().err().map(|e| e.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{dataset::Dataset, graph::tests::two_collection_dataset};

	fn plan_for(datasets: &[Dataset], kinds: &[&str]) -> TraversalPlan {
		let kinds: BTreeSet<String> = kinds.iter().map(|k| (*k).to_string()).collect();
		TraversalPlan::new(&DatasetGraph::new(datasets, &kinds).unwrap())
	}

	#[test]
	fn orders_nodes_after_their_inputs() {
		let plan = plan_for(&[two_collection_dataset()], &["email"]);
		assert!(plan.is_traversable());
		let order: Vec<String> =
			plan.nodes.iter().map(|n| n.address.collection.clone()).collect();
		assert_eq!(order, ["customer", "address"]);
	}

	#[test]
	fn incoming_edges_precede_every_node() {
		let plan = plan_for(&[two_collection_dataset()], &["email"]);
		let mut produced: BTreeSet<CollectionAddress> =
			BTreeSet::from([CollectionAddress::root()]);
		for node in &plan.nodes {
			for edge in &node.incoming_edges {
				assert!(
					produced.contains(&edge.from.collection_address),
					"{} consumed before {} produced",
					node.address,
					edge.from.collection_address
				);
			}
			produced.insert(node.address.clone());
		}
	}

	#[test]
	fn unreferenced_collections_are_reported_unreachable() {
		let mut dataset = two_collection_dataset();
		// Severing the reference leaves address with no incoming edges
		for field in &mut dataset.collections[0].fields {
			field.references.clear();
		}
		let plan = plan_for(&[dataset], &["email"]);
		assert!(!plan.is_traversable());
		let details = plan.details();
		assert!(!details.is_traversable);
		let msg = details.msg.unwrap();
		assert!(msg.contains("Some nodes were not reachable"));
		assert!(msg.contains("postgres_example_test_dataset:address"));
		assert_eq!(plan.nodes.len(), 1);
	}

	#[test]
	fn bidirectional_references_make_their_cycle_not_traversable() {
		let mut dataset = two_collection_dataset();
		// An unspecified direction expands to two directed edges, forming a
		// two-node cycle even though both ends stay reachable from the root
		for field in &mut dataset.collections[0].fields {
			for reference in &mut field.references {
				reference.1 = None;
			}
		}
		let plan = plan_for(&[dataset], &["email"]);
		assert!(!plan.is_traversable());
		assert_eq!(plan.nodes.len(), 0);
		assert_eq!(plan.unreachable.len(), 2);
		let msg = plan.details().msg.unwrap();
		assert!(msg.contains("postgres_example_test_dataset:address"));
		assert!(msg.contains("postgres_example_test_dataset:customer"));
		assert!(plan.require_complete().is_err());
	}

	#[test]
	fn cycles_off_the_root_become_unreachable() {
		let mut dataset = two_collection_dataset();
		// Remove the identity tag so nothing links the cycle to the root
		for field in &mut dataset.collections[0].fields {
			field.identity = None;
		}
		for field in &mut dataset.collections[0].fields {
			for reference in &mut field.references {
				reference.1 = None;
			}
		}
		let plan = plan_for(&[dataset], &["email"]);
		assert_eq!(plan.nodes.len(), 0);
		assert_eq!(plan.unreachable.len(), 2);
	}

	#[test]
	fn query_field_paths_are_incoming_edge_targets() {
		let plan = plan_for(&[two_collection_dataset()], &["email"]);
		let customer = &plan.nodes[0];
		assert_eq!(
			customer.query_field_paths(),
			BTreeSet::from([FieldPath::parse("email")])
		);
		let address = &plan.nodes[1];
		assert_eq!(
			address.query_field_paths(),
			BTreeSet::from([FieldPath::parse("id")])
		);
	}
}
