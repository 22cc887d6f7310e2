//! The function graph: address spaces, varnodes, p-code ops and the local scope

mod address;
mod funcdata;
mod op;
mod scope;
mod varnode;

pub use address::{calc_mask, sign_extend, AddrSpace, Address, SpaceId, SpaceKind, SpaceManager};
pub use funcdata::{FuncProto, Funcdata};
pub use op::{HaltKind, OpCode, OpId, PcodeOp, Slot};
pub use scope::{EntryId, ScopeLocal, Symbol, SymbolEntry, SymbolId, TypeRecommendation};
pub use varnode::{Varnode, VarnodeFlags, VarnodeId};
