//! Depth-first propagation from a single root

use std::collections::HashSet;
use std::ops::AddAssign;

use serde::Serialize;

use super::{Pass, PropagationObserver};
use crate::ir::{Funcdata, OpId, Slot, VarnodeId};

/// Counters from one or more traversals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationStats {
    pub edges_tried: usize,
    pub edges_accepted: usize,
    pub values_entered: usize,
}

impl AddAssign for PropagationStats {
    fn add_assign(&mut self, other: Self) {
        self.edges_tried += other.edges_tried;
        self.edges_accepted += other.edges_accepted;
        self.values_entered += other.values_entered;
    }
}

/// A varnode being propagated from, with its untried edges
struct Frame {
    edges: Vec<(OpId, Slot, Slot)>,
    cursor: usize,
}

impl Frame {
    /// Edges leave through every reader first, then back through the
    /// defining op into its inputs
    fn new(fd: &Funcdata, vn: VarnodeId) -> Self {
        let varnode = fd.varnode(vn);
        let mut edges = Vec::new();
        for &op_id in varnode.descendants() {
            let op = fd.op(op_id);
            let Some(slot) = op.slot_of(vn) else { continue };
            let inslot = Slot::Input(slot);
            if op.output().is_some() {
                edges.push((op_id, inslot, Slot::Output));
            }
            edges.extend((0..op.num_inputs()).map(|i| (op_id, inslot, Slot::Input(i))));
        }
        if let Some(def) = varnode.def() {
            let op = fd.op(def);
            edges.extend((0..op.num_inputs()).map(|i| (def, Slot::Output, Slot::Input(i))));
        }
        Self { edges, cursor: 0 }
    }

    fn next_edge(&mut self) -> Option<(OpId, Slot, Slot)> {
        let edge = self.edges.get(self.cursor).copied();
        self.cursor += 1;
        edge
    }
}

impl<O: PropagationObserver + ?Sized> Pass<'_, O> {
    /// Push the temporary type of `root` as far as it will go. Each varnode
    /// is entered at most once per call.
    pub(crate) fn propagate_one_type(&mut self, root: VarnodeId) -> PropagationStats {
        let mut stats = PropagationStats::default();
        let mut visited = HashSet::new();
        visited.insert(root);
        stats.values_entered += 1;
        self.observer.value_entered(root, root);

        let mut stack = vec![Frame::new(self.fd, root)];
        while let Some(frame) = stack.last_mut() {
            let Some((op, inslot, outslot)) = frame.next_edge() else {
                stack.pop();
                continue;
            };
            stats.edges_tried += 1;
            if !self.propagate_type_edge(op, inslot, outslot) {
                continue;
            }
            stats.edges_accepted += 1;
            let Some(dest) = self.fd.op(op).varnode_at(outslot) else {
                continue;
            };
            if visited.insert(dest) {
                stats.values_entered += 1;
                self.observer.value_entered(root, dest);
                stack.push(Frame::new(self.fd, dest));
            }
        }
        self.stats += stats;
        stats
    }
}
