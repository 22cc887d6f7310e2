//! Local symbol scope of a function

use serde::{Deserialize, Serialize};

use super::address::{Address, SpaceId};
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u32);

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeId,
    pub type_locked: bool,
}

/// Maps a storage range onto (part of) a symbol
#[derive(Debug, Clone, Copy)]
pub struct SymbolEntry {
    pub symbol: SymbolId,
    pub addr: Address,
    pub size: u32,
    /// Byte offset of this range within the symbol
    pub offset: u32,
}

/// A data-type suggested by an upstream pass for an input at an address
#[derive(Debug, Clone, Copy)]
pub struct TypeRecommendation {
    pub addr: Address,
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct ScopeLocal {
    space: SpaceId,
    symbols: Vec<Symbol>,
    entries: Vec<SymbolEntry>,
    recommendations: Vec<TypeRecommendation>,
}

impl ScopeLocal {
    pub fn new(space: SpaceId) -> Self {
        Self {
            space,
            symbols: Vec::new(),
            entries: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// The stack space this scope's locals live in
    pub fn space(&self) -> SpaceId {
        self.space
    }

    pub fn add_symbol(&mut self, name: &str, ty: TypeId, type_locked: bool) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.to_string(),
            ty,
            type_locked,
        });
        id
    }

    pub fn add_entry(&mut self, symbol: SymbolId, addr: Address, size: u32, offset: u32) -> EntryId {
        let id = EntryId(self.entries.len() as u32);
        self.entries.push(SymbolEntry {
            symbol,
            addr,
            size,
            offset,
        });
        id
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn entry(&self, id: EntryId) -> &SymbolEntry {
        &self.entries[id.0 as usize]
    }

    pub fn find_symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .iter()
            .position(|s| s.name == name)
            .map(|i| SymbolId(i as u32))
    }

    /// Retype a symbol, as local-variable structuring does between rounds
    pub fn set_symbol_type(&mut self, id: SymbolId, ty: TypeId) {
        self.symbols[id.0 as usize].ty = ty;
    }

    pub fn add_recommendation(&mut self, addr: Address, ty: TypeId) {
        self.recommendations.push(TypeRecommendation { addr, ty });
    }

    pub fn recommendations(&self) -> &[TypeRecommendation] {
        &self.recommendations
    }
}
