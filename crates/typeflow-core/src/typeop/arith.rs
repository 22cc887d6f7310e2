//! Pointer arithmetic and truncation

use super::Edge;
use crate::ir::{calc_mask, Funcdata, OpCode, PcodeOp, Slot};
use crate::types::{Metatype, TypeFactory, TypeId};

/// How an addition relates to the pointer operand at a given slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddPointer {
    /// Adds zero
    Zero,
    /// Adds a known constant byte offset
    Offset(u64),
    /// Does not look like pointer arithmetic
    NotPointerAdd,
    /// Adds a variable multiple of the element size
    ArrayIndex,
}

/// Classify the addition performed by `op` on the pointer at input `slot`
pub(crate) fn classify_add(
    types: &TypeFactory,
    fd: &Funcdata,
    op: &PcodeOp,
    slot: usize,
    elem_size: u32,
) -> AddPointer {
    let constant = |index: usize| {
        op.input(index)
            .map(|vn| fd.varnode(vn))
            .filter(|vn| vn.is_constant())
    };
    let from_offset = |off: u64| if off == 0 { AddPointer::Zero } else { AddPointer::Offset(off) };
    let elem_size = u64::from(elem_size);

    match op.opcode() {
        OpCode::Ptradd => {
            if slot != 0 {
                return AddPointer::NotPointerAdd;
            }
            let Some(mult) = constant(2).map(|vn| vn.offset()) else {
                return AddPointer::NotPointerAdd;
            };
            if let Some(index) = constant(1) {
                return from_offset(index.offset().wrapping_mul(mult) & calc_mask(index.size()));
            }
            if elem_size != 0 && mult % elem_size != 0 {
                return AddPointer::NotPointerAdd;
            }
            AddPointer::ArrayIndex
        }
        OpCode::Ptrsub => {
            if slot != 0 {
                return AddPointer::NotPointerAdd;
            }
            match constant(1) {
                Some(off) => from_offset(off.offset()),
                None => AddPointer::NotPointerAdd,
            }
        }
        OpCode::IntAdd => {
            let Some(other) = op.input(1 - slot.min(1)) else {
                return AddPointer::NotPointerAdd;
            };
            let othervn = fd.varnode(other);
            if !othervn.is_constant() {
                if let Some(def) = othervn.def().map(|d| fd.op(d)) {
                    if def.opcode() == OpCode::IntMult {
                        if let Some(scale) = def.input(1).map(|vn| fd.varnode(vn)).filter(|vn| vn.is_constant()) {
                            // Multiplying by -1 is a pointer difference, not an index
                            if scale.offset() == calc_mask(scale.size()) {
                                return AddPointer::NotPointerAdd;
                            }
                            if elem_size != 0 && scale.offset() % elem_size != 0 {
                                return AddPointer::NotPointerAdd;
                            }
                        }
                        return AddPointer::ArrayIndex;
                    }
                }
                if elem_size == 1 {
                    return AddPointer::ArrayIndex;
                }
                return AddPointer::NotPointerAdd;
            }
            if types.metatype(othervn.temp_type()) == Metatype::Ptr {
                return AddPointer::NotPointerAdd;
            }
            from_offset(othervn.offset())
        }
        _ => AddPointer::NotPointerAdd,
    }
}

/// Type of the result of adding to the pointer `alt` at input `slot`
pub(crate) fn propagate_add_in_to_out(types: &mut TypeFactory, edge: &Edge<'_>, slot: usize) -> TypeId {
    let op = edge.op;
    let out_temp = op.output().map(|vn| edge.fd.varnode(vn).temp_type()).unwrap_or(edge.alt);
    let Some(pointee) = types.ptr_to(edge.alt) else {
        return out_temp;
    };
    let command = classify_add(types, edge.fd, op, slot, types.size(pointee));

    let offset = match command {
        AddPointer::NotPointerAdd => return out_temp,
        AddPointer::ArrayIndex => return edge.alt,
        AddPointer::Zero => 0,
        AddPointer::Offset(off) => off,
    };
    let allow_wrap = op.opcode() != OpCode::Ptrsub;
    let mut pointer = Some(edge.alt);
    let mut remaining = offset.wrapping_mul(u64::from(types.word_size(edge.alt)));
    loop {
        let Some(current) = pointer else { break };
        pointer = types.down_chain(current, remaining, allow_wrap).map(|(next, rest)| {
            remaining = rest;
            next
        });
        if pointer.is_none() || remaining == 0 {
            break;
        }
    }
    let Some(mut result) = pointer else {
        return if command == AddPointer::Zero { edge.alt } else { out_temp };
    };
    if edge.source_is_spacebase() && types.is_spacebase_pointer(result) {
        let byte = types.unknown(1);
        result = types.pointer_sized(types.size(result), byte, types.word_size(result));
    }
    result
}

pub(super) fn propagate_int_add(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    let meta = types.metatype(edge.alt);
    if meta != Metatype::Ptr {
        if meta != Metatype::Int && meta != Metatype::Uint {
            return None;
        }
        let constant_in1 = edge.op.input(1).is_some_and(|vn| edge.fd.varnode(vn).is_constant());
        if edge.outslot != Slot::Input(1) || !constant_in1 {
            return None;
        }
    } else if edge.is_input_to_input() {
        return None;
    }
    if edge.fd.varnode(edge.outvn).is_constant() && meta != Metatype::Ptr {
        return Some(edge.alt);
    }
    match edge.inslot {
        // Pointer types do not flow from a sum back into its operands
        Slot::Output => Some(edge.dest_temp()),
        Slot::Input(slot) => Some(propagate_add_in_to_out(types, edge, slot)),
    }
}

pub(super) fn propagate_ptradd(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if edge.inslot == Slot::Input(2) || edge.outslot == Slot::Input(2) {
        return None;
    }
    propagate_ptrsub(types, edge)
}

pub(super) fn propagate_ptrsub(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if edge.is_input_to_input() {
        return None;
    }
    if types.metatype(edge.alt) != Metatype::Ptr {
        return None;
    }
    match edge.inslot {
        Slot::Output => Some(edge.dest_temp()),
        Slot::Input(slot) => Some(propagate_add_in_to_out(types, edge, slot)),
    }
}

/// A truncation of an aggregate takes the type of the component it extracts
pub(super) fn propagate_subpiece(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    if edge.inslot != Slot::Input(0) || edge.outslot != Slot::Output {
        return None;
    }
    if !matches!(types.metatype(edge.alt), Metatype::Struct | Metatype::Array) {
        return None;
    }
    let invn = edge.fd.varnode(edge.invn);
    let outvn = edge.fd.varnode(edge.outvn);
    let lsb = edge.op.input(1).map(|vn| edge.fd.varnode(vn)).filter(|vn| vn.is_constant())?.offset();
    let lsb = u32::try_from(lsb).ok()?;
    let big_endian = edge.fd.spaces().get(invn.addr().space).big_endian;
    let byte_offset = if big_endian {
        invn.size().checked_sub(outvn.size())?.checked_sub(lsb)?
    } else {
        lsb
    };
    types.exact_piece(edge.alt, byte_offset, outvn.size())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::super::{propagate_type, Edge};
    use crate::ir::{OpCode, Slot};
    use crate::types::{Field, Metatype};

    #[test]
    fn test_int_add_walks_into_struct() {
        let mut h = Harness::new();
        let int4 = h.types.base(4, Metatype::Int);
        let float4 = h.types.base(4, Metatype::Float);
        let st = h
            .types
            .structure(
                "pair",
                8,
                vec![
                    Field { offset: 0, name: "i".into(), ty: int4 },
                    Field { offset: 4, name: "f".into(), ty: float4 },
                ],
            )
            .unwrap();
        let p_st = h.types.pointer(st, 1);
        let (a1, a2, code) = (h.addr(), h.addr(), h.addr());
        let base = h.fd.new_input(&mut h.types, 8, a1);
        let four = h.fd.new_constant(&mut h.types, 8, 4);
        let sum = h.fd.new_varnode(&mut h.types, 8, a2);
        let op = h.fd.new_op(OpCode::IntAdd, code, &[base, four], Some(sum)).unwrap();

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: p_st,
            invn: base,
            outvn: sum,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        let result = propagate_type(&mut h.types, &edge).unwrap();
        assert_eq!(h.types.ptr_to(result), Some(float4));

        // Nothing flows from the sum back into the pointer operand
        let back = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: result,
            invn: sum,
            outvn: base,
            inslot: Slot::Output,
            outslot: Slot::Input(0),
        };
        assert_eq!(propagate_type(&mut h.types, &back), Some(h.fd.varnode(base).temp_type()));
    }

    #[test]
    fn test_int_add_integer_reaches_constant_only() {
        let mut h = Harness::new();
        let int4 = h.types.base(4, Metatype::Int);
        let (a1, a2, a3, code) = (h.addr(), h.addr(), h.addr(), h.addr());
        let x = h.fd.new_input(&mut h.types, 4, a1);
        let one = h.fd.new_constant(&mut h.types, 4, 1);
        let sum = h.fd.new_varnode(&mut h.types, 4, a2);
        let op = h.fd.new_op(OpCode::IntAdd, code, &[x, one], Some(sum)).unwrap();
        let y = h.fd.new_input(&mut h.types, 4, a3);
        let op2 = h.fd.new_op(OpCode::IntAdd, code, &[x, y], None).unwrap();

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: int4,
            invn: x,
            outvn: one,
            inslot: Slot::Input(0),
            outslot: Slot::Input(1),
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(int4));

        let edge = Edge { outvn: sum, outslot: Slot::Output, ..edge };
        assert_eq!(propagate_type(&mut h.types, &edge), None);

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op2),
            alt: int4,
            invn: x,
            outvn: y,
            inslot: Slot::Input(0),
            outslot: Slot::Input(1),
        };
        assert_eq!(propagate_type(&mut h.types, &edge), None);
    }

    #[test]
    fn test_index_scaled_add_keeps_pointer() {
        let mut h = Harness::new();
        let int4 = h.types.base(4, Metatype::Int);
        let p_int = h.types.pointer(int4, 1);
        let (a1, a2, a3, a4, code) = (h.addr(), h.addr(), h.addr(), h.addr(), h.addr());
        let base = h.fd.new_input(&mut h.types, 8, a1);
        let index = h.fd.new_input(&mut h.types, 8, a2);
        let four = h.fd.new_constant(&mut h.types, 8, 4);
        let scaled = h.fd.new_varnode(&mut h.types, 8, a3);
        h.fd.new_op(OpCode::IntMult, code, &[index, four], Some(scaled)).unwrap();
        let sum = h.fd.new_varnode(&mut h.types, 8, a4);
        let op = h.fd.new_op(OpCode::IntAdd, code, &[base, scaled], Some(sum)).unwrap();

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: p_int,
            invn: base,
            outvn: sum,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(p_int));
    }

    #[test]
    fn test_ptradd_ignores_multiplier_slot() {
        let mut h = Harness::new();
        let int4 = h.types.base(4, Metatype::Int);
        let p_int = h.types.pointer(int4, 1);
        let (a1, a2, a3, code) = (h.addr(), h.addr(), h.addr(), h.addr());
        let base = h.fd.new_input(&mut h.types, 8, a1);
        let index = h.fd.new_input(&mut h.types, 8, a2);
        let four = h.fd.new_constant(&mut h.types, 8, 4);
        let out = h.fd.new_varnode(&mut h.types, 8, a3);
        let op = h.fd.new_op(OpCode::Ptradd, code, &[base, index, four], Some(out)).unwrap();

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: p_int,
            invn: base,
            outvn: out,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(p_int));

        let edge = Edge { invn: four, inslot: Slot::Input(2), ..edge };
        assert_eq!(propagate_type(&mut h.types, &edge), None);
    }

    #[test]
    fn test_subpiece_extracts_field() {
        let mut h = Harness::new();
        let int4 = h.types.base(4, Metatype::Int);
        let float4 = h.types.base(4, Metatype::Float);
        let st = h
            .types
            .structure(
                "pair",
                8,
                vec![
                    Field { offset: 0, name: "i".into(), ty: int4 },
                    Field { offset: 4, name: "f".into(), ty: float4 },
                ],
            )
            .unwrap();
        let (a1, a2, code) = (h.addr(), h.addr(), h.addr());
        let whole = h.fd.new_input(&mut h.types, 8, a1);
        let four = h.fd.new_constant(&mut h.types, 4, 4);
        let high = h.fd.new_varnode(&mut h.types, 4, a2);
        let op = h.fd.new_op(OpCode::Subpiece, code, &[whole, four], Some(high)).unwrap();

        let edge = Edge {
            fd: &h.fd,
            op: h.fd.op(op),
            alt: st,
            invn: whole,
            outvn: high,
            inslot: Slot::Input(0),
            outslot: Slot::Output,
        };
        assert_eq!(propagate_type(&mut h.types, &edge), Some(float4));

        let edge = Edge { alt: int4, ..edge };
        assert_eq!(propagate_type(&mut h.types, &edge), None);
    }
}
