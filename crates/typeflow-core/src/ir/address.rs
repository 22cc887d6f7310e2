//! Address spaces and addresses

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeflowError};

/// Index of an address space within a [`SpaceManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceId(pub u8);

/// What kind of storage an address space models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    /// Constants: the offset is the value
    Constant,
    /// Registers and RAM
    Processor,
    /// The local stack frame, addressed relative to the space-base register
    Stack,
    /// Temporaries introduced by instruction lifting
    Unique,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrSpace {
    pub id: SpaceId,
    pub name: String,
    pub kind: SpaceKind,
    /// Size of an address in bytes
    pub addr_size: u32,
    /// Number of bytes per addressable unit
    pub word_size: u32,
    pub big_endian: bool,
}

impl AddrSpace {
    /// Mask covering every valid offset in this space
    pub fn mask(&self) -> u64 {
        calc_mask(self.addr_size)
    }

    /// Wrap an offset into the space
    pub fn wrap(&self, offset: u64) -> u64 {
        offset & self.mask()
    }

    /// Convert a byte offset into an address offset in this space
    pub fn byte_to_address(&self, offset: u64) -> u64 {
        if self.word_size <= 1 {
            offset
        } else {
            offset / u64::from(self.word_size)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub space: SpaceId,
    pub offset: u64,
}

impl Address {
    pub fn new(space: SpaceId, offset: u64) -> Self {
        Self { space, offset }
    }
}

/// The set of address spaces a function graph refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceManager {
    spaces: Vec<AddrSpace>,
    by_name: IndexMap<String, SpaceId>,
}

impl SpaceManager {
    /// Name of the constant space every manager starts with
    pub const CONSTANT: &'static str = "const";

    pub fn new() -> Self {
        let mut mgr = Self {
            spaces: Vec::new(),
            by_name: IndexMap::new(),
        };
        // The constant space always exists and always has id 0
        mgr.spaces.push(AddrSpace {
            id: SpaceId(0),
            name: Self::CONSTANT.to_string(),
            kind: SpaceKind::Constant,
            addr_size: 8,
            word_size: 1,
            big_endian: false,
        });
        mgr.by_name.insert(Self::CONSTANT.to_string(), SpaceId(0));
        mgr
    }

    /// Register a new address space, returning its id
    pub fn add_space(&mut self, name: &str, kind: SpaceKind, addr_size: u32, word_size: u32) -> Result<SpaceId> {
        if self.by_name.contains_key(name) {
            return Err(TypeflowError::InvalidGraph(format!("address space '{name}' defined twice")));
        }
        if kind == SpaceKind::Constant {
            return Err(TypeflowError::InvalidGraph("only one constant space may exist".to_string()));
        }
        let index = u8::try_from(self.spaces.len())
            .map_err(|_| TypeflowError::InvalidGraph("too many address spaces".to_string()))?;
        let id = SpaceId(index);
        self.spaces.push(AddrSpace {
            id,
            name: name.to_string(),
            kind,
            addr_size,
            word_size: word_size.max(1),
            big_endian: false,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn set_big_endian(&mut self, id: SpaceId, big_endian: bool) {
        if let Some(space) = self.spaces.get_mut(usize::from(id.0)) {
            space.big_endian = big_endian;
        }
    }

    pub fn get(&self, id: SpaceId) -> &AddrSpace {
        &self.spaces[usize::from(id.0)]
    }

    pub fn by_name(&self, name: &str) -> Option<SpaceId> {
        self.by_name.get(name).copied()
    }

    pub fn constant_space(&self) -> SpaceId {
        SpaceId(0)
    }

    /// The first processor space, which holds ordinary data
    pub fn default_data_space(&self) -> Option<&AddrSpace> {
        self.spaces.iter().find(|s| s.kind == SpaceKind::Processor)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddrSpace> {
        self.spaces.iter()
    }
}

impl Default for SpaceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Mask with the low `size` bytes set
pub fn calc_mask(size: u32) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

/// Sign-extend the low `size` bytes of `value`
pub fn sign_extend(value: u64, size: u32) -> i64 {
    if size == 0 || size >= 8 {
        return value as i64;
    }
    let shift = 64 - size * 8;
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_mask() {
        assert_eq!(calc_mask(1), 0xff);
        assert_eq!(calc_mask(4), 0xffff_ffff);
        assert_eq!(calc_mask(8), u64::MAX);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0xfc, 1), -4);
        assert_eq!(sign_extend(0x7f, 1), 127);
        assert_eq!(sign_extend(0xffff_fff8, 4), -8);
        assert_eq!(sign_extend(8, 8), 8);
    }

    #[test]
    fn test_space_registration() {
        let mut spaces = SpaceManager::new();
        let stack = spaces.add_space("stack", SpaceKind::Stack, 4, 1).unwrap();
        assert_eq!(spaces.by_name("stack"), Some(stack));
        assert_eq!(spaces.get(stack).wrap(0x1_0000_0008), 8);
        assert!(spaces.add_space("stack", SpaceKind::Stack, 4, 1).is_err());
        assert!(spaces.default_data_space().is_none());
    }
}
