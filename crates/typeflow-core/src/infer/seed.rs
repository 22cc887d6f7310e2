//! Initial type guesses

use super::{ChangeCause, Pass, PropagationObserver};
use crate::ir::{Funcdata, VarnodeId};
use crate::typeop;
use crate::types::{Metatype, TypeFactory, TypeId};

/// Type implied for `vn` by the ops defining and reading it. The flag is
/// set when the defining op forbids inferring the type from readers.
pub fn local_type(types: &mut TypeFactory, fd: &Funcdata, vn: VarnodeId) -> (TypeId, bool) {
    let varnode = fd.varnode(vn);
    if varnode.is_type_locked() {
        return (varnode.ty(), false);
    }
    let mut best = None;
    if let Some(def) = varnode.def().map(|d| fd.op(d)) {
        let ty = typeop::local_output_type(types, fd, def);
        if def.stops_type_propagation() {
            return (ty, true);
        }
        best = Some(ty);
    }
    for &op_id in varnode.descendants() {
        let op = fd.op(op_id);
        let Some(slot) = op.slot_of(vn) else { continue };
        let ty = typeop::local_input_type(types, fd, op, slot);
        best = match best {
            Some(current) if !types.is_more_specific(ty, current) => Some(current),
            _ => Some(ty),
        };
    }
    let ty = match best {
        Some(ty) => ty,
        None => types.unknown(varnode.size()),
    };
    (ty, false)
}

impl<O: PropagationObserver + ?Sized> Pass<'_, O> {
    /// Seed the temporary type of every observable varnode
    pub(crate) fn build_local_types(&mut self) {
        for vn in self.fd.observable_values() {
            let (ty, needs_block) = self.seed_type(vn);
            if needs_block {
                self.fd.varnode_mut(vn).set_stop_up_propagation();
            }
            self.set_temp_type(vn, ty, ChangeCause::Seed);
        }
    }

    fn seed_type(&mut self, vn: VarnodeId) -> (TypeId, bool) {
        let varnode = self.fd.varnode(vn);
        if let Some(entry) = varnode.symbol_entry().map(|e| *self.fd.scope().entry(e)) {
            let symbol = self.fd.scope().symbol(entry.symbol);
            if symbol.type_locked && !varnode.is_type_locked() {
                let offset = varnode
                    .offset()
                    .wrapping_sub(entry.addr.offset)
                    .wrapping_add(u64::from(entry.offset));
                let piece = u32::try_from(offset)
                    .ok()
                    .and_then(|offset| self.types.exact_piece(symbol.ty, offset, varnode.size()));
                if let Some(piece) = piece {
                    if self.types.metatype(piece) != Metatype::Unknown {
                        return (piece, false);
                    }
                }
            }
        }
        local_type(self.types, self.fd, vn)
    }
}
