//! The per-function data-flow graph and its analysis state

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use smallvec::SmallVec;
use tracing::warn;

use super::address::{calc_mask, Address, SpaceId, SpaceManager};
use super::op::{HaltKind, OpCode, OpId, PcodeOp, Slot};
use super::scope::{EntryId, ScopeLocal};
use super::varnode::{Varnode, VarnodeFlags, VarnodeId};
use crate::error::{Result, TypeflowError};
use crate::infer::TypeRecoveryState;
use crate::types::{TypeFactory, TypeId};

/// Location ordering of varnodes: space, offset, size, then creation order
type LocKey = (SpaceId, u64, u32, VarnodeId);

/// What the function's prototype says about its return value
#[derive(Debug, Clone, Copy, Default)]
pub struct FuncProto {
    pub output_locked: bool,
    pub output_type: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct Funcdata {
    name: String,
    spaces: SpaceManager,
    varnodes: Vec<Varnode>,
    ops: Vec<PcodeOp>,
    loc_index: BTreeSet<LocKey>,
    scope: ScopeLocal,
    proto: FuncProto,
    heritage: HashMap<SpaceId, u32>,
    spacebase_input: Option<VarnodeId>,
    union_fields: HashMap<(OpId, Slot), usize>,
    type_recovery_started: bool,
    type_recovery_exceeded: bool,
    warnings: Vec<String>,
    pub(crate) recovery: TypeRecoveryState,
}

impl Funcdata {
    /// Create an empty function whose locals live in `stack_space`
    pub fn new(name: &str, spaces: SpaceManager, stack_space: SpaceId) -> Self {
        Self {
            name: name.to_string(),
            spaces,
            varnodes: Vec::new(),
            ops: Vec::new(),
            loc_index: BTreeSet::new(),
            scope: ScopeLocal::new(stack_space),
            proto: FuncProto::default(),
            heritage: HashMap::new(),
            spacebase_input: None,
            union_fields: HashMap::new(),
            type_recovery_started: true,
            type_recovery_exceeded: false,
            warnings: Vec::new(),
            recovery: TypeRecoveryState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spaces(&self) -> &SpaceManager {
        &self.spaces
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a varnode with an unknown committed type
    pub fn new_varnode(&mut self, types: &mut TypeFactory, size: u32, addr: Address) -> VarnodeId {
        let id = VarnodeId(self.varnodes.len() as u32);
        let ty = types.unknown(size);
        self.varnodes.push(Varnode {
            id,
            size,
            addr,
            flags: VarnodeFlags::default(),
            nz_mask: calc_mask(size),
            def: None,
            descend: SmallVec::new(),
            ty,
            temp_ty: ty,
            entry: None,
        });
        self.loc_index.insert((addr.space, addr.offset, size, id));
        id
    }

    pub fn new_constant(&mut self, types: &mut TypeFactory, size: u32, value: u64) -> VarnodeId {
        let value = value & calc_mask(size);
        let space = self.spaces.constant_space();
        let id = self.new_varnode(types, size, Address::new(space, value));
        let vn = &mut self.varnodes[id.0 as usize];
        vn.flags.constant = true;
        vn.nz_mask = value;
        id
    }

    /// Create a varnode holding a value on entry to the function
    pub fn new_input(&mut self, types: &mut TypeFactory, size: u32, addr: Address) -> VarnodeId {
        let id = self.new_varnode(types, size, addr);
        self.varnodes[id.0 as usize].flags.input = true;
        id
    }

    /// Create an op reading `inputs` and optionally writing `output`
    pub fn new_op(
        &mut self,
        opcode: OpCode,
        addr: Address,
        inputs: &[VarnodeId],
        output: Option<VarnodeId>,
    ) -> Result<OpId> {
        for &vn in inputs.iter().chain(output.iter()) {
            if vn.0 as usize >= self.varnodes.len() {
                return Err(TypeflowError::UnknownVarnode(format!("#{}", vn.0)));
            }
        }
        if let Some(out) = output {
            let outvn = &self.varnodes[out.0 as usize];
            if outvn.def.is_some() || outvn.is_constant() || outvn.is_input() {
                return Err(TypeflowError::DuplicateOutput(format!("#{}", out.0)));
            }
        }
        let id = OpId(self.ops.len() as u32);
        self.ops.push(PcodeOp {
            id,
            opcode,
            addr,
            inputs: SmallVec::from_slice(inputs),
            output,
            dead: false,
            halt: HaltKind::Normal,
            stops_type_propagation: false,
            indirect_creation: false,
        });
        for &vn in inputs {
            let descend = &mut self.varnodes[vn.0 as usize].descend;
            // An op reading the same varnode twice is listed once
            if !descend.contains(&id) {
                descend.push(id);
            }
        }
        if let Some(out) = output {
            self.varnodes[out.0 as usize].def = Some(id);
        }
        Ok(id)
    }

    pub fn varnode(&self, id: VarnodeId) -> &Varnode {
        &self.varnodes[id.0 as usize]
    }

    pub fn varnode_mut(&mut self, id: VarnodeId) -> &mut Varnode {
        &mut self.varnodes[id.0 as usize]
    }

    pub fn op(&self, id: OpId) -> &PcodeOp {
        &self.ops[id.0 as usize]
    }

    pub fn num_varnodes(&self) -> usize {
        self.varnodes.len()
    }

    pub fn varnodes(&self) -> impl Iterator<Item = &Varnode> {
        self.varnodes.iter()
    }

    pub fn ops(&self) -> impl Iterator<Item = &PcodeOp> {
        self.ops.iter()
    }

    /// Lock a varnode's committed type so no pass may change it
    pub fn lock_type(&mut self, vn: VarnodeId, ty: TypeId) {
        self.varnode_mut(vn).lock_type(ty);
    }

    pub fn set_nz_mask(&mut self, vn: VarnodeId, mask: u64) {
        let size = self.varnode(vn).size;
        self.varnode_mut(vn).nz_mask = mask & calc_mask(size);
    }

    pub fn set_annotation(&mut self, vn: VarnodeId) {
        self.varnode_mut(vn).flags.annotation = true;
    }

    pub fn set_addr_tied(&mut self, vn: VarnodeId) {
        self.varnode_mut(vn).flags.addr_tied = true;
    }

    /// Designate the input varnode holding the stack frame's base address
    pub fn set_spacebase_input(&mut self, vn: VarnodeId) {
        let varnode = self.varnode_mut(vn);
        varnode.flags.spacebase = true;
        varnode.flags.input = true;
        self.spacebase_input = Some(vn);
    }

    pub fn spacebase_input(&self) -> Option<VarnodeId> {
        self.spacebase_input
    }

    pub fn bind_symbol(&mut self, vn: VarnodeId, entry: EntryId) {
        self.varnode_mut(vn).entry = Some(entry);
    }

    pub fn set_op_dead(&mut self, op: OpId) {
        self.ops[op.0 as usize].dead = true;
    }

    pub fn set_halt(&mut self, op: OpId, halt: HaltKind) {
        self.ops[op.0 as usize].halt = halt;
    }

    pub fn set_stops_type_propagation(&mut self, op: OpId) {
        self.ops[op.0 as usize].stops_type_propagation = true;
    }

    pub fn set_indirect_creation(&mut self, op: OpId) {
        self.ops[op.0 as usize].indirect_creation = true;
    }

    // ------------------------------------------------------------------
    // Function-level state
    // ------------------------------------------------------------------

    pub fn scope(&self) -> &ScopeLocal {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut ScopeLocal {
        &mut self.scope
    }

    pub fn stack_space(&self) -> SpaceId {
        self.scope.space()
    }

    pub fn proto(&self) -> &FuncProto {
        &self.proto
    }

    pub fn proto_mut(&mut self) -> &mut FuncProto {
        &mut self.proto
    }

    /// Number of completed heritage passes over `space`
    pub fn heritage_pass(&self, space: SpaceId) -> u32 {
        self.heritage.get(&space).copied().unwrap_or(0)
    }

    pub fn set_heritage_pass(&mut self, space: SpaceId, passes: u32) {
        self.heritage.insert(space, passes);
    }

    pub fn has_type_recovery_started(&self) -> bool {
        self.type_recovery_started
    }

    pub fn set_type_recovery_started(&mut self, started: bool) {
        self.type_recovery_started = started;
    }

    pub fn is_type_recovery_exceeded(&self) -> bool {
        self.type_recovery_exceeded
    }

    pub fn set_type_recovery_exceeded(&mut self) {
        self.type_recovery_exceeded = true;
    }

    pub fn type_recovery(&self) -> &TypeRecoveryState {
        &self.recovery
    }

    /// Attach a warning to the function's header comment
    pub fn warning_header(&mut self, msg: &str) {
        warn!(function = %self.name, "{}", msg);
        self.warnings.push(msg.to_string());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Union field chosen for a particular edge, if one has been decided
    pub fn union_field(&self, op: OpId, slot: Slot) -> Option<usize> {
        self.union_fields.get(&(op, slot)).copied()
    }

    pub fn set_union_field(&mut self, op: OpId, slot: Slot, field: usize) {
        self.union_fields.insert((op, slot), field);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All varnodes in location order
    pub fn varnodes_by_location(&self) -> impl Iterator<Item = VarnodeId> + '_ {
        self.loc_index.iter().map(|&(_, _, _, id)| id)
    }

    /// Varnodes taking part in type recovery, in location order
    pub fn observable_values(&self) -> Vec<VarnodeId> {
        self.varnodes_by_location()
            .filter(|&id| self.varnode(id).is_observable())
            .collect()
    }

    /// Varnodes in `space` whose offset lies in `[start, end)`, in location
    /// order. An `end` of `None` runs to the end of the space.
    pub fn values_in_range(&self, space: SpaceId, start: u64, end: Option<u64>) -> Vec<VarnodeId> {
        let lower = Bound::Included((space, start, 0, VarnodeId(0)));
        let upper = match end {
            Some(end) if end <= start => return Vec::new(),
            Some(end) => Bound::Excluded((space, end, 0, VarnodeId(0))),
            None => Bound::Included((space, u64::MAX, u32::MAX, VarnodeId(u32::MAX))),
        };
        self.loc_index
            .range((lower, upper))
            .map(|&(_, _, _, id)| id)
            .collect()
    }

    /// The input varnode of `size` bytes at `addr`
    pub fn find_input(&self, size: u32, addr: Address) -> Option<VarnodeId> {
        self.values_in_range(addr.space, addr.offset, addr.offset.checked_add(1))
            .into_iter()
            .find(|&id| {
                let vn = self.varnode(id);
                vn.is_input() && vn.size == size
            })
    }

    pub fn return_ops(&self) -> impl Iterator<Item = &PcodeOp> {
        self.ops.iter().filter(|op| op.opcode == OpCode::Return)
    }

    /// Install the scope's recommended types on matching, unlocked inputs.
    /// Returns the number of varnodes whose type changed.
    pub fn apply_type_recommendations(&mut self, types: &TypeFactory) -> usize {
        let recommendations = self.scope.recommendations().to_vec();
        let mut applied = 0;
        for rec in recommendations {
            let Some(vn) = self.find_input(types.size(rec.ty), rec.addr) else {
                continue;
            };
            if !self.varnode(vn).is_type_locked() && self.varnode_mut(vn).lock_type(rec.ty) {
                applied += 1;
            }
        }
        applied
    }

    /// Compute possible-value masks for written varnodes from their
    /// defining ops. Inputs keep whatever mask they were given.
    pub fn compute_nz_masks(&mut self) {
        for vn in &mut self.varnodes {
            if vn.def.is_some() {
                vn.nz_mask = 0;
            }
        }
        // Masks only grow, so this settles; the bound guards odd cycles
        for _ in 0..64 {
            let mut changed = false;
            for index in 0..self.ops.len() {
                let op = &self.ops[index];
                let Some(out) = op.output else { continue };
                let mask = self.op_nz_mask(op) & calc_mask(self.varnode(out).size);
                let outvn = &mut self.varnodes[out.0 as usize];
                if outvn.nz_mask | mask != outvn.nz_mask {
                    outvn.nz_mask |= mask;
                    changed = true;
                }
            }
            if !changed {
                return;
            }
        }
        for index in 0..self.ops.len() {
            if let Some(out) = self.ops[index].output {
                let vn = &mut self.varnodes[out.0 as usize];
                vn.nz_mask = calc_mask(vn.size);
            }
        }
    }

    fn op_nz_mask(&self, op: &PcodeOp) -> u64 {
        let mask = |slot: usize| op.input(slot).map_or(u64::MAX, |vn| self.varnode(vn).nz_mask);
        let constant = |slot: usize| {
            op.input(slot)
                .map(|vn| self.varnode(vn))
                .filter(|vn| vn.is_constant())
                .map(|vn| vn.offset())
        };
        if op.opcode.is_boolean_output() {
            return 1;
        }
        match op.opcode {
            OpCode::Copy | OpCode::IntZext => mask(0),
            OpCode::Multiequal | OpCode::IntOr | OpCode::IntXor => {
                (0..op.num_inputs()).fold(0, |acc, slot| acc | mask(slot))
            }
            OpCode::IntAnd => mask(0) & mask(1),
            OpCode::Piece => {
                let low_size = op.input(1).map_or(0, |vn| self.varnode(vn).size);
                mask(0).checked_shl(low_size * 8).unwrap_or(0) | mask(1)
            }
            OpCode::Subpiece => match constant(1) {
                Some(c) if c < 8 => mask(0) >> (c * 8),
                _ => u64::MAX,
            },
            OpCode::IntLeft => match constant(1) {
                Some(c) if c < 64 => mask(0) << c,
                _ => u64::MAX,
            },
            OpCode::IntRight => match constant(1) {
                Some(c) if c < 64 => mask(0) >> c,
                _ => u64::MAX,
            },
            _ => u64::MAX,
        }
    }
}
