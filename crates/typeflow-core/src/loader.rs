//! Building a function graph from a JSON description
//!
//! A description names its address spaces, data-types, varnodes and ops.
//! Varnodes are referred to by name. Data-types are written as expressions:
//! `int4`, `uint2`, `bool1`, `float8`, `undefined4`, `code`, `void`,
//! `spacebase` (the stack frame), any declared type name, followed by any
//! number of `*` and `[N]` suffixes.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TypeflowError};
use crate::ir::{Address, Funcdata, HaltKind, OpCode, SpaceKind, SpaceManager, VarnodeId};
use crate::types::{Field, Metatype, TypeFactory, TypeId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    pub name: String,
    #[serde(default = "default_pointer_size")]
    pub pointer_size: u32,
    pub spaces: Vec<SpaceSpec>,
    /// Space holding the function's locals
    pub stack_space: String,
    #[serde(default)]
    pub types: Vec<TypeSpec>,
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    pub varnodes: Vec<VarnodeSpec>,
    pub ops: Vec<OpSpec>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationSpec>,
    /// Completed heritage passes, by space name
    #[serde(default)]
    pub heritage: IndexMap<String, u32>,
    #[serde(default)]
    pub prototype: PrototypeSpec,
    #[serde(default = "default_true")]
    pub type_recovery_started: bool,
}

fn default_pointer_size() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

fn default_word_size() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceSpec {
    pub name: String,
    pub kind: SpaceKind,
    #[serde(default = "default_pointer_size")]
    pub addr_size: u32,
    #[serde(default = "default_word_size")]
    pub word_size: u32,
    #[serde(default)]
    pub big_endian: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeSpec {
    Struct { name: String, size: u32, fields: Vec<FieldSpec> },
    Union { name: String, size: u32, fields: Vec<FieldSpec> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default)]
    pub offset: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub type_locked: bool,
}

/// Binding of a varnode to (part of) a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRef {
    pub name: String,
    /// Offset of the varnode's storage within the symbol
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VarnodeSpec {
    pub name: String,
    pub space: String,
    pub offset: u64,
    pub size: u32,
    pub input: bool,
    pub spacebase: bool,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub type_lock: bool,
    pub annotation: bool,
    pub addr_tied: bool,
    pub nz_mask: Option<u64>,
    pub symbol: Option<SymbolRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpSpec {
    pub opcode: OpCode,
    #[serde(default)]
    pub addr: u64,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub halt: HaltKind,
    #[serde(default)]
    pub stops_type_propagation: bool,
    #[serde(default)]
    pub indirect_creation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSpec {
    pub space: String,
    pub offset: u64,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrototypeSpec {
    pub output_locked: bool,
    pub output_type: Option<String>,
}

/// A function built from a [`GraphSpec`], with its varnode names
#[derive(Debug, Clone)]
pub struct LoadedFunction {
    pub types: TypeFactory,
    pub fd: Funcdata,
    pub names: IndexMap<String, VarnodeId>,
}

impl LoadedFunction {
    pub fn value(&self, name: &str) -> Option<VarnodeId> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, vn: VarnodeId) -> Option<&str> {
        self.names
            .iter()
            .find(|(_, id)| **id == vn)
            .map(|(name, _)| name.as_str())
    }

    /// Name of the committed type of the named varnode
    pub fn type_name(&self, name: &str) -> Option<&str> {
        self.value(name).map(|vn| self.types.name(self.fd.varnode(vn).ty()))
    }
}

/// Fewest inputs each opcode is read with
fn min_inputs(opcode: OpCode) -> usize {
    match opcode {
        OpCode::Store | OpCode::Ptradd => 3,
        OpCode::Load | OpCode::Subpiece | OpCode::Ptrsub | OpCode::Indirect | OpCode::Cbranch | OpCode::Piece => 2,
        OpCode::Multiequal => 1,
        OpCode::Return | OpCode::Branch | OpCode::Branchind | OpCode::Call | OpCode::Callind | OpCode::Callother => 1,
        op if op.is_boolean_output() && !matches!(op, OpCode::BoolNegate | OpCode::FloatNan) => 2,
        OpCode::IntAdd
        | OpCode::IntSub
        | OpCode::IntXor
        | OpCode::IntAnd
        | OpCode::IntOr
        | OpCode::IntLeft
        | OpCode::IntRight
        | OpCode::IntSright
        | OpCode::IntMult
        | OpCode::IntDiv
        | OpCode::IntSdiv
        | OpCode::IntRem
        | OpCode::IntSrem
        | OpCode::FloatAdd
        | OpCode::FloatSub
        | OpCode::FloatMult
        | OpCode::FloatDiv => 2,
        _ => 1,
    }
}

impl GraphSpec {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn build(&self) -> Result<LoadedFunction> {
        let mut spaces = SpaceManager::new();
        for space in &self.spaces {
            let id = spaces.add_space(&space.name, space.kind, space.addr_size, space.word_size)?;
            spaces.set_big_endian(id, space.big_endian);
        }
        let stack = spaces
            .by_name(&self.stack_space)
            .ok_or_else(|| TypeflowError::UnknownSpace(self.stack_space.clone()))?;
        let code_space = spaces
            .default_data_space()
            .map(|s| s.id)
            .unwrap_or(stack);

        let mut types = TypeFactory::new(self.pointer_size);
        let mut parser = TypeParser {
            named: IndexMap::new(),
            stack_name: self.stack_space.clone(),
            stack,
        };
        for spec in &self.types {
            parser.declare(&mut types, spec)?;
        }

        let mut fd = Funcdata::new(&self.name, spaces, stack);
        fd.set_type_recovery_started(self.type_recovery_started);
        for symbol in &self.symbols {
            let ty = parser.parse(&mut types, &symbol.ty)?;
            fd.scope_mut().add_symbol(&symbol.name, ty, symbol.type_locked);
        }

        let mut names = IndexMap::new();
        for spec in &self.varnodes {
            if names.contains_key(&spec.name) {
                return Err(TypeflowError::InvalidGraph(format!("varnode '{}' defined twice", spec.name)));
            }
            let vn = self.build_varnode(&mut types, &mut fd, &mut parser, spec)?;
            names.insert(spec.name.clone(), vn);
        }

        let lookup = |name: &String| {
            names
                .get(name)
                .copied()
                .ok_or_else(|| TypeflowError::UnknownVarnode(name.clone()))
        };
        for spec in &self.ops {
            let inputs = spec.inputs.iter().map(lookup).collect::<Result<Vec<_>>>()?;
            let output = spec.output.as_ref().map(lookup).transpose()?;
            let required = min_inputs(spec.opcode);
            if inputs.len() < required {
                return Err(TypeflowError::SlotOutOfRange {
                    addr: spec.addr,
                    slot: required - 1,
                    inputs: inputs.len(),
                });
            }
            let op = fd.new_op(spec.opcode, Address::new(code_space, spec.addr), &inputs, output)?;
            if spec.dead {
                fd.set_op_dead(op);
            }
            if spec.halt != HaltKind::Normal {
                fd.set_halt(op, spec.halt);
            }
            if spec.stops_type_propagation {
                fd.set_stops_type_propagation(op);
            }
            if spec.indirect_creation {
                fd.set_indirect_creation(op);
            }
        }

        for rec in &self.recommendations {
            let space = fd
                .spaces()
                .by_name(&rec.space)
                .ok_or_else(|| TypeflowError::UnknownSpace(rec.space.clone()))?;
            let ty = parser.parse(&mut types, &rec.ty)?;
            fd.scope_mut().add_recommendation(Address::new(space, rec.offset), ty);
        }
        for (name, &passes) in &self.heritage {
            let space = fd
                .spaces()
                .by_name(name)
                .ok_or_else(|| TypeflowError::UnknownSpace(name.clone()))?;
            fd.set_heritage_pass(space, passes);
        }
        fd.proto_mut().output_locked = self.prototype.output_locked;
        if let Some(expr) = &self.prototype.output_type {
            fd.proto_mut().output_type = Some(parser.parse(&mut types, expr)?);
        }

        // Given masks on free values feed the computed ones; masks on
        // written values override what the graph computes
        let given: Vec<(VarnodeId, u64)> = self
            .varnodes
            .iter()
            .filter_map(|spec| Some((*names.get(&spec.name)?, spec.nz_mask?)))
            .collect();
        for &(vn, mask) in &given {
            if !fd.varnode(vn).is_written() {
                fd.set_nz_mask(vn, mask);
            }
        }
        fd.compute_nz_masks();
        for &(vn, mask) in &given {
            if fd.varnode(vn).is_written() {
                fd.set_nz_mask(vn, mask);
            }
        }

        debug!(
            function = %self.name,
            varnodes = fd.num_varnodes(),
            types = types.len(),
            "graph loaded"
        );
        Ok(LoadedFunction { types, fd, names })
    }

    fn build_varnode(
        &self,
        types: &mut TypeFactory,
        fd: &mut Funcdata,
        parser: &mut TypeParser,
        spec: &VarnodeSpec,
    ) -> Result<VarnodeId> {
        if spec.size == 0 {
            return Err(TypeflowError::InvalidGraph(format!("varnode '{}' has no size", spec.name)));
        }
        let space = fd
            .spaces()
            .by_name(&spec.space)
            .ok_or_else(|| TypeflowError::UnknownSpace(spec.space.clone()))?;
        let addr = Address::new(space, spec.offset);
        let vn = if space == fd.spaces().constant_space() {
            fd.new_constant(types, spec.size, spec.offset)
        } else if spec.input || spec.spacebase {
            fd.new_input(types, spec.size, addr)
        } else {
            fd.new_varnode(types, spec.size, addr)
        };
        if spec.spacebase {
            fd.set_spacebase_input(vn);
        }
        if spec.annotation {
            fd.set_annotation(vn);
        }
        if spec.addr_tied {
            fd.set_addr_tied(vn);
        }
        if let Some(expr) = &spec.ty {
            let ty = parser.parse(types, expr)?;
            if spec.type_lock {
                fd.lock_type(vn, ty);
            } else {
                let varnode = fd.varnode_mut(vn);
                varnode.update_type(ty);
                varnode.set_temp_type(ty);
            }
        } else if spec.type_lock {
            let ty = fd.varnode(vn).ty();
            fd.lock_type(vn, ty);
        }
        if let Some(symbol) = &spec.symbol {
            let id = fd
                .scope()
                .find_symbol(&symbol.name)
                .ok_or_else(|| TypeflowError::InvalidGraph(format!("unknown symbol '{}'", symbol.name)))?;
            let entry = fd.scope_mut().add_entry(id, addr, spec.size, symbol.offset);
            fd.bind_symbol(vn, entry);
        }
        Ok(vn)
    }
}

/// Resolves data-type expressions against the declared named types
struct TypeParser {
    named: IndexMap<String, TypeId>,
    stack_name: String,
    stack: crate::ir::SpaceId,
}

impl TypeParser {
    fn declare(&mut self, types: &mut TypeFactory, spec: &TypeSpec) -> Result<TypeId> {
        let (name, size, fields, is_union) = match spec {
            TypeSpec::Struct { name, size, fields } => (name, *size, fields, false),
            TypeSpec::Union { name, size, fields } => (name, *size, fields, true),
        };
        let mut built = Vec::with_capacity(fields.len());
        for field in fields {
            built.push(Field {
                offset: field.offset,
                name: field.name.clone(),
                ty: self.parse(types, &field.ty)?,
            });
        }
        let id = if is_union {
            types.union(name, size, built)?
        } else {
            types.structure(name, size, built)?
        };
        self.named.insert(name.clone(), id);
        Ok(id)
    }

    fn parse(&mut self, types: &mut TypeFactory, expr: &str) -> Result<TypeId> {
        let expr = expr.trim();
        if let Some(inner) = expr.strip_suffix('*') {
            let pointee = self.parse(types, inner)?;
            return Ok(types.pointer(pointee, 1));
        }
        if let Some(inner) = expr.strip_suffix(']') {
            let (element, count) = inner
                .rsplit_once('[')
                .ok_or_else(|| TypeflowError::UnknownType(expr.to_string()))?;
            let count: u32 = count
                .trim()
                .parse()
                .map_err(|_| TypeflowError::UnknownType(expr.to_string()))?;
            let element = self.parse(types, element)?;
            return types.array(element, count);
        }
        if let Some(&id) = self.named.get(expr) {
            return Ok(id);
        }
        match expr {
            "void" => return Ok(types.void()),
            "code" => return Ok(types.base(1, Metatype::Code)),
            "spacebase" => return Ok(types.spacebase(self.stack, &self.stack_name)),
            _ => {}
        }
        const PREFIXES: [(&str, Metatype); 5] = [
            ("undefined", Metatype::Unknown),
            ("uint", Metatype::Uint),
            ("int", Metatype::Int),
            ("bool", Metatype::Bool),
            ("float", Metatype::Float),
        ];
        for (prefix, metatype) in PREFIXES {
            if let Some(size) = expr.strip_prefix(prefix).and_then(|s| s.parse::<u32>().ok()) {
                if size > 0 {
                    return Ok(types.base(size, metatype));
                }
            }
        }
        Err(TypeflowError::UnknownType(expr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"{
        "name": "pick",
        "spaces": [
            { "name": "register", "kind": "processor" },
            { "name": "stack", "kind": "stack" }
        ],
        "stack_space": "stack",
        "types": [
            { "kind": "struct", "name": "pair", "size": 8,
              "fields": [ { "offset": 0, "name": "a", "type": "int4" },
                          { "offset": 4, "name": "b", "type": "float4" } ] }
        ],
        "varnodes": [
            { "name": "p", "space": "register", "offset": 0, "size": 8, "input": true,
              "type": "pair*", "type_lock": true },
            { "name": "q", "space": "register", "offset": 8, "size": 8 },
            { "name": "zero", "space": "const", "offset": 0, "size": 8 }
        ],
        "ops": [
            { "opcode": "INT_ADD", "addr": 4096, "inputs": ["p", "zero"], "output": "q" }
        ],
        "heritage": { "stack": 1 }
    }"#;

    #[test]
    fn test_build_graph() {
        let loaded = GraphSpec::from_json_str(GRAPH).unwrap().build().unwrap();
        let p = loaded.value("p").unwrap();
        assert!(loaded.fd.varnode(p).is_type_locked());
        assert_eq!(loaded.type_name("p"), Some("pair *"));
        assert_eq!(loaded.name_of(p), Some("p"));
        let zero = loaded.value("zero").unwrap();
        assert!(loaded.fd.varnode(zero).is_constant());
        assert_eq!(loaded.fd.heritage_pass(loaded.fd.stack_space()), 1);
    }

    #[test]
    fn test_type_expressions() {
        let mut types = TypeFactory::new(8);
        let mut parser = TypeParser {
            named: IndexMap::new(),
            stack_name: "stack".to_string(),
            stack: crate::ir::SpaceId(2),
        };
        let ty = parser.parse(&mut types, "uint2*[3]").unwrap();
        assert_eq!(types.name(ty), "uint2 *[3]");
        assert_eq!(types.size(ty), 24);
        let sb = parser.parse(&mut types, "spacebase*").unwrap();
        assert!(types.is_spacebase_pointer(sb));
        assert!(parser.parse(&mut types, "int0").is_err());
        assert!(parser.parse(&mut types, "widget").is_err());
    }

    #[test]
    fn test_unknown_varnode_reference() {
        let mut spec = GraphSpec::from_json_str(GRAPH).unwrap();
        spec.ops[0].inputs[1] = "missing".to_string();
        assert!(matches!(spec.build(), Err(TypeflowError::UnknownVarnode(name)) if name == "missing"));
    }

    #[test]
    fn test_arity_is_checked() {
        let mut spec = GraphSpec::from_json_str(GRAPH).unwrap();
        spec.ops[0].inputs.pop();
        assert!(matches!(spec.build(), Err(TypeflowError::SlotOutOfRange { slot: 1, inputs: 1, .. })));
    }
}
