//! The value dependency graph
//!
//! Nodes are observable values other than constants; an edge runs from each input of a live op to
//! its output. Strongly connected components of this graph are the loops
//! through which a type can come back to the value it started from.

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use typeflow_core::ir::OpId;
use typeflow_core::{Funcdata, VarnodeId};

pub fn value_graph(fd: &Funcdata) -> DiGraph<VarnodeId, OpId> {
    let mut graph = DiGraph::new();
    let mut nodes: IndexMap<VarnodeId, NodeIndex> = IndexMap::new();
    let mut node = |graph: &mut DiGraph<VarnodeId, OpId>, vn: VarnodeId| {
        *nodes.entry(vn).or_insert_with(|| graph.add_node(vn))
    };

    for vn in fd.varnodes_by_location() {
        let varnode = fd.varnode(vn);
        if varnode.is_observable() && !varnode.is_constant() {
            node(&mut graph, vn);
        }
    }
    for op in fd.ops().filter(|op| !op.is_dead()) {
        let Some(out) = op.output() else { continue };
        let to = node(&mut graph, out);
        for &input in op.inputs() {
            if fd.varnode(input).is_constant() {
                continue;
            }
            let from = node(&mut graph, input);
            graph.add_edge(from, to, op.id());
        }
    }
    graph
}

/// Values lying on a data-flow cycle, one sorted list per strongly connected
/// component, ordered by their first value
pub fn feedback_cycles(fd: &Funcdata) -> Vec<Vec<VarnodeId>> {
    let graph = value_graph(fd);
    let mut cycles: Vec<Vec<VarnodeId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut values: Vec<_> = scc.into_iter().map(|index| graph[index]).collect();
            values.sort();
            values
        })
        .collect();
    cycles.sort();
    cycles
}
