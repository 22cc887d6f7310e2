//! Per-opcode transfer functions
//!
//! Each opcode contributes three things to type recovery: the type it
//! implies for each of its inputs, the type it implies for its output, and a
//! transfer function deciding what type flows across one of its edges.

mod arith;
mod flow;
mod memory;

use crate::ir::{Funcdata, OpCode, PcodeOp, Slot, VarnodeId};
use crate::types::{Metatype, TypeFactory, TypeId};

/// Everything a transfer function may look at for one edge
pub struct Edge<'a> {
    pub fd: &'a Funcdata,
    pub op: &'a PcodeOp,
    /// Type flowing out of the source, already resolved
    pub alt: TypeId,
    pub invn: VarnodeId,
    pub outvn: VarnodeId,
    pub inslot: Slot,
    pub outslot: Slot,
}

impl Edge<'_> {
    fn is_input_to_input(&self) -> bool {
        self.inslot.is_input() && self.outslot.is_input()
    }

    fn touches_output(&self) -> bool {
        self.inslot.is_output() || self.outslot.is_output()
    }

    fn source_is_spacebase(&self) -> bool {
        self.fd.varnode(self.invn).is_spacebase()
    }

    fn dest_temp(&self) -> TypeId {
        self.fd.varnode(self.outvn).temp_type()
    }

    /// Temp type of the varnode at an input slot of the op
    fn input_temp(&self, slot: usize) -> Option<TypeId> {
        self.op.input(slot).map(|vn| self.fd.varnode(vn).temp_type())
    }
}

/// Type that flows across `edge`, or `None` if nothing may
pub fn propagate_type(types: &mut TypeFactory, edge: &Edge<'_>) -> Option<TypeId> {
    match edge.op.opcode() {
        OpCode::Copy | OpCode::Multiequal => flow::propagate_copy(types, edge),
        OpCode::Indirect => flow::propagate_indirect(types, edge),
        OpCode::IntEqual | OpCode::IntNotequal | OpCode::IntLess | OpCode::IntLessequal => {
            flow::propagate_compare(types, edge)
        }
        OpCode::IntSless | OpCode::IntSlessequal => flow::propagate_signed_compare(types, edge),
        OpCode::Load => memory::propagate_load(types, edge),
        OpCode::Store => memory::propagate_store(types, edge),
        OpCode::IntAdd => arith::propagate_int_add(types, edge),
        OpCode::Ptradd => arith::propagate_ptradd(types, edge),
        OpCode::Ptrsub => arith::propagate_ptrsub(types, edge),
        OpCode::Subpiece => arith::propagate_subpiece(types, edge),
        _ => None,
    }
}

/// Metatypes an opcode's inputs and output are read as
fn local_metatypes(opcode: OpCode) -> (Metatype, Metatype) {
    use Metatype::*;
    match opcode {
        OpCode::IntEqual | OpCode::IntNotequal | OpCode::IntSless | OpCode::IntSlessequal => (Int, Bool),
        OpCode::IntLess | OpCode::IntLessequal | OpCode::IntCarry => (Uint, Bool),
        OpCode::IntScarry | OpCode::IntSborrow => (Int, Bool),
        OpCode::IntAdd | OpCode::IntSub | OpCode::IntMult | OpCode::Int2comp | OpCode::IntSext => (Int, Int),
        OpCode::IntSright | OpCode::IntSdiv | OpCode::IntSrem => (Int, Int),
        OpCode::IntZext
        | OpCode::IntNegate
        | OpCode::IntXor
        | OpCode::IntAnd
        | OpCode::IntOr
        | OpCode::IntLeft
        | OpCode::IntRight
        | OpCode::IntDiv
        | OpCode::IntRem => (Uint, Uint),
        OpCode::BoolNegate | OpCode::BoolXor | OpCode::BoolAnd | OpCode::BoolOr => (Bool, Bool),
        OpCode::FloatEqual
        | OpCode::FloatNotequal
        | OpCode::FloatLess
        | OpCode::FloatLessequal
        | OpCode::FloatNan => (Float, Bool),
        OpCode::FloatAdd
        | OpCode::FloatSub
        | OpCode::FloatMult
        | OpCode::FloatDiv
        | OpCode::FloatNeg
        | OpCode::FloatAbs
        | OpCode::FloatSqrt
        | OpCode::FloatFloat2float => (Float, Float),
        OpCode::FloatInt2float => (Int, Float),
        OpCode::FloatTrunc => (Float, Int),
        // Index and element size of a pointer addition are signed integers
        OpCode::Ptradd => (Int, Unknown),
        _ => (Unknown, Unknown),
    }
}

/// Type an op implies for the varnode it reads at `slot`
pub fn local_input_type(types: &mut TypeFactory, fd: &Funcdata, op: &PcodeOp, slot: usize) -> TypeId {
    let Some(vn) = op.input(slot) else {
        return types.unknown(1);
    };
    let varnode = fd.varnode(vn);
    let size = varnode.size();
    match op.opcode() {
        OpCode::Ptradd | OpCode::Ptrsub if slot == 0 => return varnode.ty(),
        OpCode::Ptrsub => return types.unknown(size),
        OpCode::Return if slot > 0 => {
            if let Some(ty) = fd.proto().output_type {
                if types.metatype(ty) != Metatype::Void && types.size(ty) == size {
                    return ty;
                }
            }
            return types.unknown(size);
        }
        // Shift amounts are plain integers whatever is being shifted
        OpCode::IntLeft | OpCode::IntRight | OpCode::IntSright if slot == 1 => {
            return types.base(size, Metatype::Int);
        }
        _ => {}
    }
    let (meta_in, _) = local_metatypes(op.opcode());
    types.base(size, meta_in)
}

/// Type an op implies for its own output
pub fn local_output_type(types: &mut TypeFactory, fd: &Funcdata, op: &PcodeOp) -> TypeId {
    let Some(out) = op.output() else {
        return types.void();
    };
    let varnode = fd.varnode(out);
    if matches!(op.opcode(), OpCode::Ptradd | OpCode::Ptrsub) {
        return varnode.ty();
    }
    let (_, meta_out) = local_metatypes(op.opcode());
    types.base(varnode.size(), meta_out)
}

/// Pointer to a single unknown byte in the default data space, sized like `like`
fn pointer_to_unknown_byte(types: &mut TypeFactory, fd: &Funcdata, like: TypeId) -> TypeId {
    let word_size = fd.spaces().default_data_space().map_or(1, |s| s.word_size);
    let byte = types.unknown(1);
    types.pointer_sized(types.size(like), byte, word_size)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ir::{Address, Funcdata, SpaceId, SpaceKind, SpaceManager};
    use crate::types::TypeFactory;

    pub struct Harness {
        pub types: TypeFactory,
        pub fd: Funcdata,
        pub ram: SpaceId,
        pub stack: SpaceId,
        next: u64,
    }

    impl Harness {
        pub fn new() -> Self {
            let mut spaces = SpaceManager::new();
            let ram = spaces.add_space("ram", SpaceKind::Processor, 8, 1).unwrap();
            let stack = spaces.add_space("stack", SpaceKind::Stack, 8, 1).unwrap();
            Self {
                types: TypeFactory::new(8),
                fd: Funcdata::new("f", spaces, stack),
                ram,
                stack,
                next: 0,
            }
        }

        /// Fresh register-like address
        pub fn addr(&mut self) -> Address {
            self.next += 0x10;
            Address::new(self.ram, 0x1000 + self.next)
        }
    }
}
