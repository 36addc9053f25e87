use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::computation::{Computation, ComputationMetadata};
use crate::error::StreamError;

pub type ComputationSupplier = Arc<dyn Fn() -> Box<dyn Computation> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct TopologyNode {
    pub(crate) supplier: ComputationSupplier,
    pub(crate) metadata: ComputationMetadata,
}

impl fmt::Debug for TopologyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyNode")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Immutable DAG of computations bound to concrete stream names.
///
/// Edges are implied by shared stream names: an output slot of one node
/// bound to `s2` feeds every node with an input slot bound to `s2`. Built
/// once through the builder and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<TopologyNode>,
    index: HashMap<String, usize>,
}

impl Topology {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder { nodes: Vec::new() }
    }

    pub fn computation_names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|node| node.metadata.name.clone())
            .collect()
    }

    pub fn metadata(&self, name: &str) -> Option<&ComputationMetadata> {
        self.index.get(name).map(|i| &self.nodes[*i].metadata)
    }

    pub fn supplier(&self, name: &str) -> Option<ComputationSupplier> {
        self.index.get(name).map(|i| self.nodes[*i].supplier.clone())
    }

    /// Every stream referenced by a binding, in first-seen order.
    pub fn streams(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut streams = Vec::new();
        for node in &self.nodes {
            for stream in node
                .metadata
                .input_streams
                .iter()
                .chain(node.metadata.output_streams.iter())
            {
                if seen.insert(stream.clone()) {
                    streams.push(stream.clone());
                }
            }
        }
        streams
    }

    pub(crate) fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }
}

pub struct TopologyBuilder {
    nodes: Vec<(ComputationSupplier, Vec<String>)>,
}

impl TopologyBuilder {
    /// Register a computation with its slot bindings, e.g.
    /// `["i1:input", "o1:output"]`.
    pub fn add_computation<F>(mut self, supplier: F, bindings: Vec<&str>) -> Self
    where
        F: Fn() -> Box<dyn Computation> + Send + Sync + 'static,
    {
        self.nodes.push((
            Arc::new(supplier),
            bindings.into_iter().map(|b| b.to_string()).collect(),
        ));
        self
    }

    /// Validate arities and bindings, instantiating each computation once to
    /// probe its declared metadata.
    pub fn build(self) -> Result<Topology, StreamError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut index = HashMap::new();
        for (supplier, bindings) in self.nodes {
            let declared = supplier().metadata();
            let resolved = resolve_bindings(&declared, &bindings)?;
            if index.contains_key(&resolved.name) {
                return Err(StreamError::InvalidTopology(format!(
                    "duplicate computation name: {}",
                    resolved.name
                )));
            }
            index.insert(resolved.name.clone(), nodes.len());
            nodes.push(TopologyNode {
                supplier,
                metadata: resolved,
            });
        }
        Ok(Topology { nodes, index })
    }
}

/// Rewrite declared slots (`i<k>`, `o<k>`) into concrete stream names.
fn resolve_bindings(
    declared: &ComputationMetadata,
    bindings: &[String],
) -> Result<ComputationMetadata, StreamError> {
    let mut inputs: Vec<Option<String>> = vec![None; declared.input_streams.len()];
    let mut outputs: Vec<Option<String>> = vec![None; declared.output_streams.len()];
    for binding in bindings {
        let (slot, stream) = binding.split_once(':').ok_or_else(|| {
            StreamError::InvalidTopology(format!(
                "computation {}: binding '{}' is not of the form i<k>:stream or o<k>:stream",
                declared.name, binding
            ))
        })?;
        let (slots, kind) = match slot.as_bytes().first() {
            Some(b'i') => (&mut inputs, "input"),
            Some(b'o') => (&mut outputs, "output"),
            _ => {
                return Err(StreamError::InvalidTopology(format!(
                    "computation {}: unknown slot '{}'",
                    declared.name, slot
                )))
            }
        };
        let position: usize = slot[1..].parse().map_err(|_| {
            StreamError::InvalidTopology(format!(
                "computation {}: unknown slot '{}'",
                declared.name, slot
            ))
        })?;
        if position == 0 || position > slots.len() {
            return Err(StreamError::InvalidTopology(format!(
                "computation {}: {} slot {} is out of range, {} declared",
                declared.name,
                kind,
                slot,
                slots.len()
            )));
        }
        if slots[position - 1].is_some() {
            return Err(StreamError::InvalidTopology(format!(
                "computation {}: slot '{}' bound twice",
                declared.name, slot
            )));
        }
        slots[position - 1] = Some(stream.to_string());
    }
    let input_streams = collect_bound(&declared.name, "input", inputs)?;
    let output_streams = collect_bound(&declared.name, "output", outputs)?;
    Ok(ComputationMetadata::with_streams(
        declared.name.clone(),
        input_streams,
        output_streams,
    ))
}

fn collect_bound(
    name: &str,
    kind: &str,
    slots: Vec<Option<String>>,
) -> Result<Vec<String>, StreamError> {
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| {
                StreamError::InvalidTopology(format!(
                    "computation {}: {} slot {}{} has no binding",
                    name,
                    kind,
                    if kind == "input" { "i" } else { "o" },
                    i + 1
                ))
            })
        })
        .collect()
}
