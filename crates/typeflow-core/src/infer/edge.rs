//! Deciding whether a type crosses a single edge

use tracing::trace;

use super::{ChangeCause, Pass, PropagationObserver};
use crate::ir::{OpId, Slot};
use crate::typeop::{self, Edge};
use crate::types::{Metatype, TypeId};

impl<O: PropagationObserver + ?Sized> Pass<'_, O> {
    /// Try to move the temporary type at `inslot` of `op` to `outslot`.
    /// Returns true if the destination's temporary type was replaced.
    pub(crate) fn propagate_type_edge(&mut self, op_id: OpId, inslot: Slot, outslot: Slot) -> bool {
        let op = self.fd.op(op_id);
        let (Some(invn), Some(outvn)) = (op.varnode_at(inslot), op.varnode_at(outslot)) else {
            return false;
        };
        let opcode = op.opcode();

        let mut alt = self.fd.varnode(invn).temp_type();
        if self.types.needs_resolution(alt) {
            alt = self.resolve_in_flow(alt, op_id, inslot);
        }
        if inslot == outslot {
            return false;
        }
        let dest = self.fd.varnode(outvn);
        if dest.is_annotation() || dest.is_type_locked() {
            return false;
        }
        if outslot.is_input() && dest.stops_up_propagation() {
            return false;
        }
        if self.types.metatype(alt) == Metatype::Bool && dest.nz_mask() > 1 {
            return false;
        }
        if self.suppress_merges && opcode.is_merge() {
            return false;
        }

        let edge = Edge {
            fd: self.fd,
            op: self.fd.op(op_id),
            alt,
            invn,
            outvn,
            inslot,
            outslot,
        };
        let Some(newtype) = typeop::propagate_type(self.types, &edge) else {
            return false;
        };
        let current = self.fd.varnode(outvn).temp_type();
        if !self.types.is_more_specific(newtype, current) {
            return false;
        }
        trace!(
            op = opcode.name(),
            from = %self.types.display(current),
            to = %self.types.display(newtype),
            "edge accepted"
        );
        self.set_temp_type(outvn, newtype, ChangeCause::Edge { op: op_id, inslot, outslot });
        true
    }

    /// Choose a concrete field for a union flowing out of `(op, slot)`. The
    /// choice is remembered so every later visit of the edge agrees.
    fn resolve_in_flow(&mut self, ty: TypeId, op: OpId, slot: Slot) -> TypeId {
        let (union, pointer) = match self.types.ptr_to(ty) {
            Some(pointee) => (pointee, Some(ty)),
            None => (ty, None),
        };
        let field = match self.fd.union_field(op, slot) {
            Some(field) => Some(field),
            None => {
                let size = self.types.size(union);
                let chosen = self.types.best_union_field(union, size);
                if let Some(field) = chosen {
                    self.fd.set_union_field(op, slot, field);
                }
                chosen
            }
        };
        let Some(field_ty) = field.and_then(|index| self.types.union_fields(union).get(index).map(|f| f.ty)) else {
            return ty;
        };
        match pointer {
            Some(ptr) => {
                let size = self.types.size(ptr);
                let word_size = self.types.word_size(ptr);
                self.types.pointer_sized(size, field_ty, word_size)
            }
            None => field_ty,
        }
    }
}
