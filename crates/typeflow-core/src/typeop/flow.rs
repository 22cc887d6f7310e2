//! Data movement and comparisons

use super::{pointer_to_unknown_byte, Edge};
use crate::ir::Slot;
use crate::types::{Metatype, TypeFactory, TypeId};

/// COPY and MULTIEQUAL move a value unchanged between input and output
pub(super) fn propagate_copy(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if !edge.touches_output() {
        return None;
    }
    Some(pass_through(types, edge))
}

pub(super) fn propagate_indirect(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if edge.op.is_indirect_creation() {
        return None;
    }
    // Slot 1 names the op causing the indirect effect, not a value
    if edge.inslot == Slot::Input(1) || edge.outslot == Slot::Input(1) {
        return None;
    }
    if !edge.touches_output() {
        return None;
    }
    Some(pass_through(types, edge))
}

/// Both sides of an equality or unsigned comparison share a type
pub(super) fn propagate_compare(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if !edge.is_input_to_input() {
        return None;
    }
    Some(pass_through(types, edge))
}

/// Signed comparisons only carry signed integers across
pub(super) fn propagate_signed_compare(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if !edge.is_input_to_input() {
        return None;
    }
    if types.metatype(edge.alt) != Metatype::Int {
        return None;
    }
    Some(edge.alt)
}

fn pass_through(types: &mut TypeFactory, edge: &Edge<'_>) -> TypeId {
    if edge.source_is_spacebase() {
        pointer_to_unknown_byte(types, edge.fd, edge.alt)
    } else {
        edge.alt
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::super::{propagate_type, Edge};
    use crate::ir::{OpCode, Slot};
    use crate::types::Metatype;

    #[test]
    fn test_copy_moves_between_input_and_output() {
        let mut h = Harness::new();
        let (a1, a2, code) = (h.addr(), h.addr(), h.addr());
        let x = h.fd.new_input(&mut h.types, 4, a1);
        let y = h.fd.new_varnode(&mut h.types, 4, a2);
        let op = h.fd.new_op(OpCode::Copy, code, &[x], Some(y)).unwrap();
        let int4 = h.types.base(4, Metatype::Int);

        let down = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: x,
            outvn: y,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        assert_eq!(propagate_type(&mut h.types, &down), Some(int4));

        let up = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: y,
            outvn: x,
            inslot: Slot::Output,
            outslot: Slot::Input(0),
        };
        assert_eq!(propagate_type(&mut h.types, &up), Some(int4));
    }

    #[test]
    fn test_copy_of_spacebase_is_byte_pointer() {
        let mut h = Harness::new();
        let (a1, a2, code) = (h.addr(), h.addr(), h.addr());
        let sp = h.fd.new_input(&mut h.types, 8, a1);
        h.fd.set_spacebase_input(sp);
        let y = h.fd.new_varnode(&mut h.types, 8, a2);
        let op = h.fd.new_op(OpCode::Copy, code, &[sp], Some(y)).unwrap();
        let base = h.types.spacebase(h.stack, "stack");
        let sp_type = h.types.pointer(base, 1);

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: sp_type,
            invn: sp,
            outvn: y,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        let result = propagate_type(&mut h.types, &edge).unwrap();
        assert_eq!(h.types.name(result), "undefined1 *");
    }

    #[test]
    fn test_merge_does_not_flow_between_inputs() {
        let mut h = Harness::new();
        let (a1, a2, a3, code) = (h.addr(), h.addr(), h.addr(), h.addr());
        let x = h.fd.new_input(&mut h.types, 4, a1);
        let y = h.fd.new_input(&mut h.types, 4, a2);
        let m = h.fd.new_varnode(&mut h.types, 4, a3);
        let op = h.fd.new_op(OpCode::Multiequal, code, &[x, y], Some(m)).unwrap();
        let int4 = h.types.base(4, Metatype::Int);
        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: x,
            outvn: y,
            inslot: Slot::Input(0),
            outslot: Slot::Input(1),
        };
        assert_eq!(propagate_type(&mut h.types, &edge), None);
    }

    #[test]
    fn test_signed_compare_requires_int() {
        let mut h = Harness::new();
        let (a1, a2, a3, code) = (h.addr(), h.addr(), h.addr(), h.addr());
        let x = h.fd.new_input(&mut h.types, 4, a1);
        let y = h.fd.new_input(&mut h.types, 4, a2);
        let b = h.fd.new_varnode(&mut h.types, 1, a3);
        let op = h.fd.new_op(OpCode::IntSless, code, &[x, y], Some(b)).unwrap();
        let int4 = h.types.base(4, Metatype::Int);
        let uint4 = h.types.base(4, Metatype::Uint);

        let mut edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: x,
            outvn: y,
            inslot: Slot::Input(0),
            outslot: Slot::Input(1),
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(int4));
        edge.alt = uint4;
        assert_eq!(propagate_type(&mut h.types, &edge), None);
        edge.alt = int4;
        edge.outvn = b;
        edge.outslot = Slot::Output;
        assert_eq!(propagate_type(&mut h.types, &edge), None);
    }

    #[test]
    fn test_indirect_creation_blocks() {
        let mut h = Harness::new();
        let (a1, a2, code) = (h.addr(), h.addr(), h.addr());
        let x = h.fd.new_input(&mut h.types, 4, a1);
        let iop = h.fd.new_constant(&mut h.types, 4, 0);
        let y = h.fd.new_varnode(&mut h.types, 4, a2);
        let op = h.fd.new_op(OpCode::Indirect, code, &[x, iop], Some(y)).unwrap();
        let int4 = h.types.base(4, Metatype::Int);

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: x,
            outvn: y,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(int4));

        h.fd.set_indirect_creation(op);
        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: x,
            outvn: y,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        assert_eq!(propagate_type(&mut h.types, &edge), None);
    }
}
