//! LOAD and STORE
//!
//! Input 0 of both ops is a constant naming the address space accessed.
//! Types flow between the pointer operand and the value loaded or stored.

use super::Edge;
use crate::ir::{SpaceId, Slot};
use crate::types::{TypeFactory, TypeId};

fn accessed_word_size(edge: &Edge<'_>) -> u32 {
    edge.op
        .input(0)
        .map(|vn| edge.fd.varnode(vn))
        .filter(|vn| vn.is_constant())
        .and_then(|vn| u8::try_from(vn.offset()).ok())
        .and_then(|index| edge.fd.spaces().iter().find(|s| s.id == SpaceId(index)))
        .map_or(1, |space| space.word_size)
}

pub(super) fn propagate_load(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if edge.inslot == Slot::Input(0) || edge.outslot == Slot::Input(0) {
        return None;
    }
    if edge.source_is_spacebase() {
        return None;
    }
    if edge.inslot.is_output() {
        // Loaded value back to the pointer it was loaded through
        let size = types.size(edge.dest_temp());
        return Some(types.pointer_no_depth(size, edge.alt, accessed_word_size(edge)));
    }
    match types.ptr_to(edge.alt) {
        Some(pointee) if types.size(pointee) == types.size(edge.dest_temp()) => Some(pointee),
        _ => Some(edge.dest_temp()),
    }
}

pub(super) fn propagate_store(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if edge.inslot == Slot::Input(0) || edge.outslot == Slot::Input(0) {
        return None;
    }
    if edge.source_is_spacebase() {
        return None;
    }
    match (edge.inslot, edge.outslot) {
        (Slot::Input(2), Slot::Input(1)) => {
            let size = types.size(edge.dest_temp());
            Some(types.pointer_no_depth(size, edge.alt, accessed_word_size(edge)))
        }
        (Slot::Input(1), Slot::Input(2)) => match types.ptr_to(edge.alt) {
            Some(pointee) if types.size(pointee) == types.size(edge.dest_temp()) => Some(pointee),
            _ => Some(edge.dest_temp()),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::super::{propagate_type, Edge};
    use crate::ir::{OpCode, Slot, VarnodeId};
    use crate::types::Metatype;

    fn load_graph(h: &mut Harness) -> (crate::ir::OpId, VarnodeId, VarnodeId) {
        let (a1, a2, code) = (h.addr(), h.addr(), h.addr());
        let space = h.fd.new_constant(&mut h.types, 8, u64::from(h.ram.0));
        let ptr = h.fd.new_input(&mut h.types, 8, a1);
        let value = h.fd.new_varnode(&mut h.types, 4, a2);
        let op = h.fd.new_op(OpCode::Load, code, &[space, ptr], Some(value)).unwrap();
        (op, ptr, value)
    }

    #[test]
    fn test_load_value_types_pointer() {
        let mut h = Harness::new();
        let (op, ptr, value) = load_graph(&mut h);
        let int4 = h.types.base(4, Metatype::Int);
        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: value,
            outvn: ptr,
            inslot: Slot::Output,
            outslot: Slot::Input(1),
        };
        let result = propagate_type(&mut h.types, &edge).unwrap();
        assert_eq!(h.types.ptr_to(result), Some(int4));
        assert_eq!(h.types.size(result), 8);
    }

    #[test]
    fn test_load_pointer_types_value() {
        let mut h = Harness::new();
        let (op, ptr, value) = load_graph(&mut h);
        let float4 = h.types.base(4, Metatype::Float);
        let float8 = h.types.base(8, Metatype::Float);
        let p_float4 = h.types.pointer(float4, 1);
        let p_float8 = h.types.pointer(float8, 1);

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: p_float4,
            invn: ptr,
            outvn: value,
            inslot: Slot::Input(1),
            outslot: Slot::Output,
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(float4));

        // A pointee of the wrong size leaves the value as it is
        let edge = Edge { alt: p_float8, ..edge };
        let current = h.fd.varnode(value).temp_type();
        assert_eq!(propagate_type(&mut h.types, &edge), Some(current));
    }

    #[test]
    fn test_store_links_pointer_and_value() {
        let mut h = Harness::new();
        let (a1, a2, code) = (h.addr(), h.addr(), h.addr());
        let space = h.fd.new_constant(&mut h.types, 8, u64::from(h.ram.0));
        let ptr = h.fd.new_input(&mut h.types, 8, a1);
        let value = h.fd.new_input(&mut h.types, 2, a2);
        let op = h.fd.new_op(OpCode::Store, code, &[space, ptr, value], None).unwrap();
        let int2 = h.types.base(2, Metatype::Int);

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int2,
            invn: value,
            outvn: ptr,
            inslot: Slot::Input(2),
            outslot: Slot::Input(1),
        };
        let p_int2 = propagate_type(&mut h.types, &edge).unwrap();
        assert_eq!(h.types.ptr_to(p_int2), Some(int2));

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: p_int2,
            invn: ptr,
            outvn: value,
            inslot: Slot::Input(1),
            outslot: Slot::Input(2),
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(int2));

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int2,
            invn: space,
            outvn: value,
            inslot: Slot::Input(0),
            outslot: Slot::Input(2),
        };
        assert_eq!(propagate_type(&mut h.types, &edge), None);
    }
}
