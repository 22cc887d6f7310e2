//! P-code operations

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::address::Address;
use super::varnode::VarnodeId;

/// Index of an op within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

/// One end of a data-flow edge through an op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The op's output
    Output,
    /// An input operand, by position
    Input(usize),
}

impl Slot {
    pub fn is_input(self) -> bool {
        matches!(self, Slot::Input(_))
    }

    pub fn is_output(self) -> bool {
        matches!(self, Slot::Output)
    }
}

/// The closed set of p-code opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpCode {
    Copy,
    Load,
    Store,
    Branch,
    Cbranch,
    Branchind,
    Call,
    Callind,
    Callother,
    Return,
    IntEqual,
    IntNotequal,
    IntSless,
    IntSlessequal,
    IntLess,
    IntLessequal,
    IntZext,
    IntSext,
    IntAdd,
    IntSub,
    IntCarry,
    IntScarry,
    IntSborrow,
    #[serde(rename = "INT_2COMP")]
    Int2comp,
    IntNegate,
    IntXor,
    IntAnd,
    IntOr,
    IntLeft,
    IntRight,
    IntSright,
    IntMult,
    IntDiv,
    IntSdiv,
    IntRem,
    IntSrem,
    BoolNegate,
    BoolXor,
    BoolAnd,
    BoolOr,
    FloatEqual,
    FloatNotequal,
    FloatLess,
    FloatLessequal,
    FloatNan,
    FloatAdd,
    FloatSub,
    FloatMult,
    FloatDiv,
    FloatNeg,
    FloatAbs,
    FloatSqrt,
    FloatInt2float,
    FloatFloat2float,
    FloatTrunc,
    Multiequal,
    Indirect,
    Piece,
    Subpiece,
    Cast,
    Ptradd,
    Ptrsub,
}

impl OpCode {
    /// Merge points in the SSA graph
    pub fn is_merge(self) -> bool {
        matches!(self, OpCode::Multiequal | OpCode::Indirect)
    }

    /// Ops whose output can only be 0 or 1
    pub fn is_boolean_output(self) -> bool {
        matches!(
            self,
            OpCode::IntEqual
                | OpCode::IntNotequal
                | OpCode::IntSless
                | OpCode::IntSlessequal
                | OpCode::IntLess
                | OpCode::IntLessequal
                | OpCode::IntCarry
                | OpCode::IntScarry
                | OpCode::IntSborrow
                | OpCode::BoolNegate
                | OpCode::BoolXor
                | OpCode::BoolAnd
                | OpCode::BoolOr
                | OpCode::FloatEqual
                | OpCode::FloatNotequal
                | OpCode::FloatLess
                | OpCode::FloatLessequal
                | OpCode::FloatNan
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Copy => "COPY",
            OpCode::Load => "LOAD",
            OpCode::Store => "STORE",
            OpCode::Branch => "BRANCH",
            OpCode::Cbranch => "CBRANCH",
            OpCode::Branchind => "BRANCHIND",
            OpCode::Call => "CALL",
            OpCode::Callind => "CALLIND",
            OpCode::Callother => "CALLOTHER",
            OpCode::Return => "RETURN",
            OpCode::IntEqual => "INT_EQUAL",
            OpCode::IntNotequal => "INT_NOTEQUAL",
            OpCode::IntSless => "INT_SLESS",
            OpCode::IntSlessequal => "INT_SLESSEQUAL",
            OpCode::IntLess => "INT_LESS",
            OpCode::IntLessequal => "INT_LESSEQUAL",
            OpCode::IntZext => "INT_ZEXT",
            OpCode::IntSext => "INT_SEXT",
            OpCode::IntAdd => "INT_ADD",
            OpCode::IntSub => "INT_SUB",
            OpCode::IntCarry => "INT_CARRY",
            OpCode::IntScarry => "INT_SCARRY",
            OpCode::IntSborrow => "INT_SBORROW",
            OpCode::Int2comp => "INT_2COMP",
            OpCode::IntNegate => "INT_NEGATE",
            OpCode::IntXor => "INT_XOR",
            OpCode::IntAnd => "INT_AND",
            OpCode::IntOr => "INT_OR",
            OpCode::IntLeft => "INT_LEFT",
            OpCode::IntRight => "INT_RIGHT",
            OpCode::IntSright => "INT_SRIGHT",
            OpCode::IntMult => "INT_MULT",
            OpCode::IntDiv => "INT_DIV",
            OpCode::IntSdiv => "INT_SDIV",
            OpCode::IntRem => "INT_REM",
            OpCode::IntSrem => "INT_SREM",
            OpCode::BoolNegate => "BOOL_NEGATE",
            OpCode::BoolXor => "BOOL_XOR",
            OpCode::BoolAnd => "BOOL_AND",
            OpCode::BoolOr => "BOOL_OR",
            OpCode::FloatEqual => "FLOAT_EQUAL",
            OpCode::FloatNotequal => "FLOAT_NOTEQUAL",
            OpCode::FloatLess => "FLOAT_LESS",
            OpCode::FloatLessequal => "FLOAT_LESSEQUAL",
            OpCode::FloatNan => "FLOAT_NAN",
            OpCode::FloatAdd => "FLOAT_ADD",
            OpCode::FloatSub => "FLOAT_SUB",
            OpCode::FloatMult => "FLOAT_MULT",
            OpCode::FloatDiv => "FLOAT_DIV",
            OpCode::FloatNeg => "FLOAT_NEG",
            OpCode::FloatAbs => "FLOAT_ABS",
            OpCode::FloatSqrt => "FLOAT_SQRT",
            OpCode::FloatInt2float => "FLOAT_INT2FLOAT",
            OpCode::FloatFloat2float => "FLOAT_FLOAT2FLOAT",
            OpCode::FloatTrunc => "FLOAT_TRUNC",
            OpCode::Multiequal => "MULTIEQUAL",
            OpCode::Indirect => "INDIRECT",
            OpCode::Piece => "PIECE",
            OpCode::Subpiece => "SUBPIECE",
            OpCode::Cast => "CAST",
            OpCode::Ptradd => "PTRADD",
            OpCode::Ptrsub => "PTRSUB",
        }
    }
}

/// How a RETURN-like op terminates the function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltKind {
    /// An ordinary return
    #[default]
    Normal,
    Halt,
    BadInstruction,
    Unimplemented,
    NoReturn,
    MissingReturn,
}

#[derive(Debug, Clone)]
pub struct PcodeOp {
    pub(crate) id: OpId,
    pub(crate) opcode: OpCode,
    pub(crate) addr: Address,
    pub(crate) inputs: SmallVec<[VarnodeId; 3]>,
    pub(crate) output: Option<VarnodeId>,
    pub(crate) dead: bool,
    pub(crate) halt: HaltKind,
    pub(crate) stops_type_propagation: bool,
    pub(crate) indirect_creation: bool,
}

impl PcodeOp {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn addr(&self) -> Address {
        self.addr
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn input(&self, slot: usize) -> Option<VarnodeId> {
        self.inputs.get(slot).copied()
    }

    pub fn inputs(&self) -> &[VarnodeId] {
        &self.inputs
    }

    pub fn output(&self) -> Option<VarnodeId> {
        self.output
    }

    /// The varnode attached at `slot`, if there is one
    pub fn varnode_at(&self, slot: Slot) -> Option<VarnodeId> {
        match slot {
            Slot::Output => self.output,
            Slot::Input(i) => self.input(i),
        }
    }

    /// First input slot holding `vn`
    pub fn slot_of(&self, vn: VarnodeId) -> Option<usize> {
        self.inputs.iter().position(|&input| input == vn)
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn halt(&self) -> HaltKind {
        self.halt
    }

    /// Whether the output's type may be inferred from its readers
    pub fn stops_type_propagation(&self) -> bool {
        self.stops_type_propagation
    }

    /// INDIRECT ops that create a value rather than modify one
    pub fn is_indirect_creation(&self) -> bool {
        self.indirect_creation
    }
}
