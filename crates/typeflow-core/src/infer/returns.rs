//! Giving every return value of a function the same type

use super::{ChangeCause, Pass, PropagationObserver};
use crate::ir::{Funcdata, HaltKind, VarnodeId};
use crate::types::{Metatype, TypeFactory};

/// Values returned by live, ordinary RETURN ops, in op order
fn returned_values(fd: &Funcdata) -> Vec<VarnodeId> {
    fd.return_ops()
        .filter(|op| !op.is_dead() && op.halt() == HaltKind::Normal && op.num_inputs() > 1)
        .filter_map(|op| op.input(1))
        .collect()
}

/// Index into `values` of the most specifically typed return value
fn canonical_return(types: &TypeFactory, fd: &Funcdata, values: &[VarnodeId]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, &vn) in values.iter().enumerate() {
        let ty = fd.varnode(vn).temp_type();
        match best {
            Some(b) if !types.is_more_specific(ty, fd.varnode(values[b]).temp_type()) => {}
            _ => best = Some(index),
        }
    }
    best
}

impl<O: PropagationObserver + ?Sized> Pass<'_, O> {
    pub(crate) fn propagate_across_returns(&mut self) {
        if self.fd.proto().output_locked {
            return;
        }
        let values = returned_values(self.fd);
        let Some(canonical) = canonical_return(self.types, self.fd, &values) else {
            return;
        };
        let base = self.fd.varnode(values[canonical]);
        let (ct, base_size) = (base.temp_type(), base.size());
        let is_bool = self.types.metatype(ct) == Metatype::Bool;

        for (index, &vn) in values.iter().enumerate() {
            if index == canonical {
                continue;
            }
            let varnode = self.fd.varnode(vn);
            if varnode.size() != base_size || varnode.is_type_locked() {
                continue;
            }
            if is_bool && varnode.nz_mask() > 1 {
                continue;
            }
            if varnode.temp_type() == ct {
                continue;
            }
            self.set_temp_type(vn, ct, ChangeCause::Return);
            self.propagate_one_type(vn);
        }
    }
}
