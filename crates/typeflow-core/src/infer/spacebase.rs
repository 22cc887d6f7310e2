//! Bridging pointer arithmetic on the stack base to direct stack accesses
//!
//! The same stack location is reached both through `sp + off` pointers and
//! as a varnode living directly in the stack space. Types learned for the
//! pointer are copied onto the direct varnodes here.

use tracing::trace;

use super::{ChangeCause, Pass, PropagationObserver};
use crate::ir::{sign_extend, OpCode, VarnodeId};
use crate::types::Metatype;

impl<O: PropagationObserver + ?Sized> Pass<'_, O> {
    /// Find every pointer formed directly from the stack base register and
    /// apply its pointed-to type to the stack
    pub(crate) fn propagate_spacebase_ref(&mut self, spcvn: VarnodeId) {
        if !self.types.is_spacebase_pointer(self.fd.varnode(spcvn).ty()) {
            return;
        }
        let stack = self.fd.spaces().get(self.fd.stack_space()).clone();
        let mut refs = Vec::new();
        for &op_id in self.fd.varnode(spcvn).descendants() {
            let op = self.fd.op(op_id);
            let Some(out) = op.output() else { continue };
            let constant = |slot: usize| {
                op.input(slot)
                    .map(|vn| self.fd.varnode(vn))
                    .filter(|vn| vn.is_constant())
                    .map(|vn| (vn.offset(), vn.size()))
            };
            let offset = match op.opcode() {
                OpCode::Copy => Some((0, 1)),
                OpCode::IntAdd | OpCode::Ptrsub => constant(1),
                OpCode::Ptradd => match (constant(1), constant(2)) {
                    (Some((index, size)), Some((mult, _))) => Some((index.wrapping_mul(mult), size)),
                    _ => None,
                },
                _ => None,
            };
            if let Some((off, size)) = offset {
                let byte_off = sign_extend(off, size) as u64;
                refs.push((out, stack.wrap(stack.byte_to_address(byte_off))));
            }
        }
        for (vn, offset) in refs {
            self.propagate_ref(vn, offset);
        }
    }

    /// Copy the pointed-to type of `vn`, which points at `offset` in the
    /// stack space, onto the stack varnodes it covers
    pub(crate) fn propagate_ref(&mut self, vn: VarnodeId, offset: u64) {
        let Some(pointee) = self.types.ptr_to(self.fd.varnode(vn).temp_type()) else {
            return;
        };
        if matches!(self.types.metatype(pointee), Metatype::Spacebase | Metatype::Unknown) {
            return;
        }
        let space = self.fd.stack_space();
        let stack = self.fd.spaces().get(space).clone();
        let size = self.types.size(pointee);
        let end = stack.wrap(offset.wrapping_add(u64::from(size)));
        // A range running off the end of the space stops there
        let end = if end < offset { None } else { Some(end) };

        let mut last = (0u64, size, Some(pointee));
        for curvn in self.fd.values_in_range(space, offset, end) {
            let varnode = self.fd.varnode(curvn);
            if !varnode.is_observable() || varnode.is_type_locked() || varnode.symbol_entry().is_some() {
                continue;
            }
            let curoff = stack.wrap(varnode.offset().wrapping_sub(offset));
            let cursize = varnode.size();
            if curoff + u64::from(cursize) > u64::from(size) {
                continue;
            }
            if (curoff, cursize) != (last.0, last.1) {
                let piece = u32::try_from(curoff)
                    .ok()
                    .and_then(|off| self.types.exact_piece(pointee, off, cursize));
                last = (curoff, cursize, piece);
            }
            let Some(piece) = last.2 else { continue };
            if self.types.is_more_specific(piece, varnode.temp_type()) {
                trace!(offset = curoff, ty = %self.types.display(piece), "stack alias");
                self.set_temp_type(curvn, piece, ChangeCause::StackAlias);
                self.propagate_one_type(curvn);
            }
        }
    }
}
