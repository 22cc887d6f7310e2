//! SSA values

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::address::Address;
use super::op::OpId;
use super::scope::EntryId;
use crate::types::TypeId;

/// Index of a varnode within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarnodeId(pub u32);

/// Boolean attributes of a varnode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarnodeFlags {
    pub constant: bool,
    pub input: bool,
    pub addr_tied: bool,
    pub type_lock: bool,
    pub annotation: bool,
    /// The value is the space-base register itself
    pub spacebase: bool,
    /// The value's type must not be inferred from how it is read
    pub stop_up_propagation: bool,
}

#[derive(Debug, Clone)]
pub struct Varnode {
    pub(crate) id: VarnodeId,
    pub(crate) size: u32,
    pub(crate) addr: Address,
    pub(crate) flags: VarnodeFlags,
    pub(crate) nz_mask: u64,
    pub(crate) def: Option<OpId>,
    pub(crate) descend: SmallVec<[OpId; 4]>,
    pub(crate) ty: TypeId,
    pub(crate) temp_ty: TypeId,
    pub(crate) entry: Option<EntryId>,
}

impl Varnode {
    pub fn id(&self) -> VarnodeId {
        self.id
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn addr(&self) -> Address {
        self.addr
    }

    pub fn offset(&self) -> u64 {
        self.addr.offset
    }

    pub fn flags(&self) -> VarnodeFlags {
        self.flags
    }

    pub fn is_constant(&self) -> bool {
        self.flags.constant
    }

    pub fn is_input(&self) -> bool {
        self.flags.input
    }

    pub fn is_written(&self) -> bool {
        self.def.is_some()
    }

    pub fn is_addr_tied(&self) -> bool {
        self.flags.addr_tied
    }

    pub fn is_type_locked(&self) -> bool {
        self.flags.type_lock
    }

    pub fn is_annotation(&self) -> bool {
        self.flags.annotation
    }

    pub fn is_spacebase(&self) -> bool {
        self.flags.spacebase
    }

    pub fn stops_up_propagation(&self) -> bool {
        self.flags.stop_up_propagation
    }

    /// Bits that may be non-zero in any value this varnode takes
    pub fn nz_mask(&self) -> u64 {
        self.nz_mask
    }

    pub fn def(&self) -> Option<OpId> {
        self.def
    }

    /// Ops reading this varnode
    pub fn descendants(&self) -> &[OpId] {
        &self.descend
    }

    pub fn has_no_descend(&self) -> bool {
        self.descend.is_empty()
    }

    /// Observable values take part in type recovery; the rest are dead
    pub fn is_observable(&self) -> bool {
        !self.is_annotation() && (self.is_written() || !self.has_no_descend())
    }

    /// The committed data-type
    pub fn ty(&self) -> TypeId {
        self.ty
    }

    /// Scratch data-type of the current propagation round
    pub fn temp_type(&self) -> TypeId {
        self.temp_ty
    }

    pub fn set_temp_type(&mut self, ty: TypeId) {
        self.temp_ty = ty;
    }

    pub fn symbol_entry(&self) -> Option<EntryId> {
        self.entry
    }

    pub(crate) fn set_stop_up_propagation(&mut self) {
        self.flags.stop_up_propagation = true;
    }

    /// Replace the committed type, honoring a type lock. Returns true on change.
    pub fn update_type(&mut self, ty: TypeId) -> bool {
        if self.ty == ty || self.is_type_locked() {
            return false;
        }
        self.ty = ty;
        true
    }

    /// Install a committed type and lock it against further change
    pub(crate) fn lock_type(&mut self, ty: TypeId) -> bool {
        let changed = self.ty != ty || !self.flags.type_lock;
        self.ty = ty;
        self.temp_ty = ty;
        self.flags.type_lock = true;
        changed
    }
}
