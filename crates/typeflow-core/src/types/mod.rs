//! Data-type lattice
//!
//! Every data-type lives in a [`TypeFactory`] and is referred to by a
//! [`TypeId`]. The factory hash-conses its types, so two structurally equal
//! types always share an id. Types are ordered by specificity through
//! [`TypeFactory::type_order`]: a type that orders before another is the
//! better description of a value.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeflowError};
use crate::ir::SpaceId;

/// Handle to a data-type owned by a [`TypeFactory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Coarse classification of a data-type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metatype {
    Void,
    Unknown,
    Int,
    Uint,
    Bool,
    Code,
    Float,
    Ptr,
    Array,
    Struct,
    Union,
    Spacebase,
}

impl Metatype {
    /// Position in the specificity order; lower is more specific
    pub fn rank(self) -> u8 {
        match self {
            Metatype::Struct => 0,
            Metatype::Union => 1,
            Metatype::Array => 2,
            Metatype::Ptr => 3,
            Metatype::Float => 4,
            Metatype::Code => 5,
            Metatype::Bool => 6,
            Metatype::Uint => 7,
            Metatype::Int => 8,
            Metatype::Unknown => 9,
            Metatype::Spacebase => 10,
            Metatype::Void => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metatype::Void => "void",
            Metatype::Unknown => "unknown",
            Metatype::Int => "int",
            Metatype::Uint => "uint",
            Metatype::Bool => "bool",
            Metatype::Code => "code",
            Metatype::Float => "float",
            Metatype::Ptr => "ptr",
            Metatype::Array => "array",
            Metatype::Struct => "struct",
            Metatype::Union => "union",
            Metatype::Spacebase => "spacebase",
        }
    }

    fn is_atomic(self) -> bool {
        matches!(
            self,
            Metatype::Unknown | Metatype::Int | Metatype::Uint | Metatype::Bool | Metatype::Code | Metatype::Float
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub offset: u32,
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Atomic types and void
    Base,
    Pointer { pointee: TypeId, word_size: u32 },
    Array { element: TypeId, count: u32 },
    Struct { fields: Vec<Field> },
    Union { fields: Vec<Field> },
    /// The contents of an address space, as seen through its base register
    Spacebase { space: SpaceId },
}

#[derive(Debug, Clone)]
pub struct Datatype {
    pub id: TypeId,
    pub name: String,
    pub size: u32,
    pub metatype: Metatype,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Base(u32, Metatype),
    Pointer { size: u32, pointee: TypeId, word_size: u32 },
    Array { element: TypeId, count: u32 },
    Named(String),
    Spacebase(SpaceId),
}

/// Depth to which pointers and aggregates are compared structurally
const COMPARE_DEPTH: u32 = 8;

#[derive(Debug, Clone)]
pub struct TypeFactory {
    types: Vec<Datatype>,
    index: IndexMap<TypeKey, TypeId>,
    pointer_size: u32,
}

impl TypeFactory {
    /// Create a factory whose default pointers are `pointer_size` bytes
    pub fn new(pointer_size: u32) -> Self {
        Self {
            types: Vec::new(),
            index: IndexMap::new(),
            pointer_size,
        }
    }

    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn intern(&mut self, key: TypeKey, build: impl FnOnce(TypeId) -> Datatype) -> TypeId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(build(id));
        self.index.insert(key, id);
        id
    }

    /// An atomic type such as `int4` or `undefined8`
    pub fn base(&mut self, size: u32, metatype: Metatype) -> TypeId {
        let metatype = if metatype.is_atomic() { metatype } else { Metatype::Unknown };
        self.intern(TypeKey::Base(size, metatype), |id| Datatype {
            id,
            name: base_name(size, metatype),
            size,
            metatype,
            kind: TypeKind::Base,
        })
    }

    pub fn unknown(&mut self, size: u32) -> TypeId {
        self.base(size, Metatype::Unknown)
    }

    pub fn void(&mut self) -> TypeId {
        self.intern(TypeKey::Base(0, Metatype::Void), |id| Datatype {
            id,
            name: "void".to_string(),
            size: 0,
            metatype: Metatype::Void,
            kind: TypeKind::Base,
        })
    }

    /// A default-sized pointer to `pointee`
    pub fn pointer(&mut self, pointee: TypeId, word_size: u32) -> TypeId {
        self.pointer_sized(self.pointer_size, pointee, word_size)
    }

    pub fn pointer_sized(&mut self, size: u32, pointee: TypeId, word_size: u32) -> TypeId {
        let name = format!("{} *", self.get(pointee).name);
        let word_size = word_size.max(1);
        self.intern(TypeKey::Pointer { size, pointee, word_size }, |id| Datatype {
            id,
            name,
            size,
            metatype: Metatype::Ptr,
            kind: TypeKind::Pointer { pointee, word_size },
        })
    }

    /// A pointer to `pointee` that never nests three pointer levels deep.
    /// A pointer to a pointer becomes a pointer to unknown bytes.
    pub fn pointer_no_depth(&mut self, size: u32, pointee: TypeId, word_size: u32) -> TypeId {
        let pointee = match self.ptr_to(pointee) {
            Some(inner) => match self.metatype(inner) {
                Metatype::Ptr => self.unknown(self.size(pointee)),
                // Already a pointer to pointer-sized unknown bytes
                Metatype::Unknown if self.size(inner) == self.size(pointee) => return pointee,
                Metatype::Unknown => self.unknown(self.size(pointee)),
                _ => pointee,
            },
            None => pointee,
        };
        self.pointer_sized(size, pointee, word_size)
    }

    /// A pointer to `pointee`, or to its element when `pointee` is an array
    pub fn pointer_strip_array(&mut self, size: u32, pointee: TypeId, word_size: u32) -> TypeId {
        let pointee = match self.get(pointee).kind {
            TypeKind::Array { element, .. } => element,
            _ => pointee,
        };
        self.pointer_sized(size, pointee, word_size)
    }

    pub fn array(&mut self, element: TypeId, count: u32) -> Result<TypeId> {
        let elem_size = self.size(element);
        if count == 0 || elem_size == 0 {
            return Err(TypeflowError::InvalidType {
                name: format!("{}[{}]", self.get(element).name, count),
                reason: "arrays need a sized element and a non-zero count".to_string(),
            });
        }
        let name = format!("{}[{}]", self.get(element).name, count);
        let size = elem_size.checked_mul(count).ok_or_else(|| TypeflowError::InvalidType {
            name: name.clone(),
            reason: "array size overflows".to_string(),
        })?;
        Ok(self.intern(TypeKey::Array { element, count }, |id| Datatype {
            id,
            name,
            size,
            metatype: Metatype::Array,
            kind: TypeKind::Array { element, count },
        }))
    }

    /// Declare a structure. Fields must be sorted, non-overlapping and fit
    /// inside `size`. Redeclaring an identical structure returns its id.
    pub fn structure(&mut self, name: &str, size: u32, fields: Vec<Field>) -> Result<TypeId> {
        let mut end = 0;
        for field in &fields {
            let field_end = field.offset.checked_add(self.size(field.ty));
            match field_end {
                Some(field_end) if field.offset >= end && field_end <= size => end = field_end,
                _ => {
                    return Err(TypeflowError::InvalidType {
                        name: name.to_string(),
                        reason: format!("field '{}' overlaps or runs past the end", field.name),
                    })
                }
            }
        }
        self.named(name, size, Metatype::Struct, TypeKind::Struct { fields })
    }

    /// Declare a union. Every field sits at offset 0.
    pub fn union(&mut self, name: &str, size: u32, fields: Vec<Field>) -> Result<TypeId> {
        if let Some(field) = fields.iter().find(|f| f.offset != 0 || self.size(f.ty) > size) {
            return Err(TypeflowError::InvalidType {
                name: name.to_string(),
                reason: format!("field '{}' does not fit the union", field.name),
            });
        }
        self.named(name, size, Metatype::Union, TypeKind::Union { fields })
    }

    fn named(&mut self, name: &str, size: u32, metatype: Metatype, kind: TypeKind) -> Result<TypeId> {
        let key = TypeKey::Named(name.to_string());
        if let Some(&id) = self.index.get(&key) {
            let existing = self.get(id);
            if existing.size == size && existing.kind == kind {
                return Ok(id);
            }
            return Err(TypeflowError::InvalidType {
                name: name.to_string(),
                reason: "redeclared with a different layout".to_string(),
            });
        }
        Ok(self.intern(key, |id| Datatype {
            id,
            name: name.to_string(),
            size,
            metatype,
            kind,
        }))
    }

    /// The type of the contents of `space`, pointed to by its base register
    pub fn spacebase(&mut self, space: SpaceId, space_name: &str) -> TypeId {
        let name = format!("{space_name}base");
        self.intern(TypeKey::Spacebase(space), |id| Datatype {
            id,
            name,
            size: 1,
            metatype: Metatype::Spacebase,
            kind: TypeKind::Spacebase { space },
        })
    }

    pub fn get(&self, id: TypeId) -> &Datatype {
        &self.types[id.0 as usize]
    }

    pub fn size(&self, id: TypeId) -> u32 {
        self.get(id).size
    }

    pub fn metatype(&self, id: TypeId) -> Metatype {
        self.get(id).metatype
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.get(id).name
    }

    pub fn find_by_name(&self, name: &str) -> Option<TypeId> {
        self.types.iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// The pointed-to type, when `id` is a pointer
    pub fn ptr_to(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id).kind {
            TypeKind::Pointer { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    pub fn word_size(&self, id: TypeId) -> u32 {
        match self.get(id).kind {
            TypeKind::Pointer { word_size, .. } => word_size,
            _ => 1,
        }
    }

    /// Whether `id` is a pointer to the contents of an address space
    pub fn is_spacebase_pointer(&self, id: TypeId) -> bool {
        self.ptr_to(id).is_some_and(|p| self.metatype(p) == Metatype::Spacebase)
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    /// Total specificity order. `Less` means `a` is more specific than `b`.
    pub fn type_order(&self, a: TypeId, b: TypeId) -> Ordering {
        self.compare(a, b, COMPARE_DEPTH)
    }

    pub fn is_more_specific(&self, a: TypeId, b: TypeId) -> bool {
        self.type_order(a, b) == Ordering::Less
    }

    fn compare(&self, a: TypeId, b: TypeId, level: u32) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let ta = self.get(a);
        let tb = self.get(b);
        let order = tb
            .size
            .cmp(&ta.size)
            .then_with(|| ta.metatype.rank().cmp(&tb.metatype.rank()));
        if order != Ordering::Equal {
            return order;
        }
        if level == 0 {
            return a.cmp(&b);
        }
        let structural = match (&ta.kind, &tb.kind) {
            (TypeKind::Pointer { pointee: pa, .. }, TypeKind::Pointer { pointee: pb, .. }) => {
                self.compare(*pa, *pb, level - 1)
            }
            (TypeKind::Array { element: ea, .. }, TypeKind::Array { element: eb, .. }) => {
                self.compare(*ea, *eb, level - 1)
            }
            (TypeKind::Struct { fields: fa }, TypeKind::Struct { fields: fb })
            | (TypeKind::Union { fields: fa }, TypeKind::Union { fields: fb }) => {
                self.compare_fields(fa, fb, level - 1)
            }
            _ => Ordering::Equal,
        };
        structural.then_with(|| a.cmp(&b))
    }

    fn compare_fields(&self, fa: &[Field], fb: &[Field], level: u32) -> Ordering {
        // More fields is more specific
        let order = fb.len().cmp(&fa.len());
        if order != Ordering::Equal {
            return order;
        }
        for (x, y) in fa.iter().zip(fb) {
            let order = x
                .offset
                .cmp(&y.offset)
                .then_with(|| self.compare(x.ty, y.ty, level));
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    /// Unions, and pointers to unions, must be resolved to a field before
    /// they can flow along an edge
    pub fn needs_resolution(&self, id: TypeId) -> bool {
        match self.get(id).kind {
            TypeKind::Union { .. } => true,
            TypeKind::Pointer { pointee, .. } => self.metatype(pointee) == Metatype::Union,
            _ => false,
        }
    }

    pub fn union_fields(&self, id: TypeId) -> &[Field] {
        match &self.get(id).kind {
            TypeKind::Union { fields } => fields,
            _ => &[],
        }
    }

    /// Pick the field of a union that best describes a value of `size` bytes.
    /// The most specific field of matching size wins; the first on ties.
    pub fn best_union_field(&self, union: TypeId, size: u32) -> Option<usize> {
        let fields = self.union_fields(union);
        let mut best: Option<usize> = None;
        for (index, field) in fields.iter().enumerate() {
            if self.size(field.ty) != size {
                continue;
            }
            match best {
                Some(b) if !self.is_more_specific(field.ty, fields[b].ty) => {}
                _ => best = Some(index),
            }
        }
        best
    }

    /// The type of exactly the bytes `[offset, offset + size)` of `id`, if
    /// those bytes form a single component. Partial components are never
    /// synthesized.
    pub fn exact_piece(&self, id: TypeId, offset: u32, size: u32) -> Option<TypeId> {
        let ty = self.get(id);
        if offset == 0 && size == ty.size {
            return Some(id);
        }
        if offset.checked_add(size)? > ty.size {
            return None;
        }
        match &ty.kind {
            TypeKind::Struct { fields } => {
                let field = fields
                    .iter()
                    .find(|f| f.offset <= offset && offset < f.offset + self.size(f.ty))?;
                self.exact_piece(field.ty, offset - field.offset, size)
            }
            TypeKind::Array { element, .. } => {
                let elem_size = self.size(*element);
                self.exact_piece(*element, offset % elem_size, size)
            }
            _ => None,
        }
    }

    /// Component of `id` containing byte `offset`, with the offset into it
    pub fn sub_type(&mut self, id: TypeId, offset: u32) -> Option<(TypeId, u32)> {
        match self.get(id).kind.clone() {
            TypeKind::Struct { fields } => fields
                .iter()
                .find(|f| f.offset <= offset && offset < f.offset + self.size(f.ty))
                .map(|f| (f.ty, offset - f.offset)),
            TypeKind::Array { element, .. } => {
                let elem_size = self.size(element);
                Some((element, offset % elem_size))
            }
            TypeKind::Spacebase { .. } => Some((self.unknown(1), 0)),
            _ => None,
        }
    }

    /// Walk one level into the pointee of `ptr` at byte `offset`. Returns the
    /// pointer to the component and the offset remaining within it.
    pub fn down_chain(&mut self, ptr: TypeId, offset: u64, allow_wrap: bool) -> Option<(TypeId, u64)> {
        let pointee = self.ptr_to(ptr)?;
        let size = self.size(ptr);
        let word_size = self.word_size(ptr);
        let pointee_size = u64::from(self.size(pointee));
        let mut offset = offset;
        if pointee_size != 0 && offset >= pointee_size {
            if !allow_wrap {
                return None;
            }
            let signed = crate::ir::sign_extend(offset, size) % pointee_size as i64;
            offset = (if signed < 0 { signed + pointee_size as i64 } else { signed }) as u64;
            if offset == 0 {
                return Some((ptr, 0));
            }
        }
        let is_array = self.metatype(pointee) == Metatype::Array;
        let (component, rest) = self.sub_type(pointee, u32::try_from(offset).ok()?)?;
        let result = if is_array {
            self.pointer_sized(size, component, word_size)
        } else {
            self.pointer_strip_array(size, component, word_size)
        };
        Some((result, u64::from(rest)))
    }

    pub fn display(&self, id: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { types: self, id }
    }
}

impl Default for TypeFactory {
    fn default() -> Self {
        Self::new(8)
    }
}

fn base_name(size: u32, metatype: Metatype) -> String {
    match metatype {
        Metatype::Unknown => format!("undefined{size}"),
        Metatype::Code => "code".to_string(),
        other => format!("{}{}", other.name(), size),
    }
}

pub struct TypeDisplay<'a> {
    types: &'a TypeFactory,
    id: TypeId,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.types.name(self.id))
    }
}
