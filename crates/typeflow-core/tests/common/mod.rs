//! Shared graph builder for integration tests

#![allow(dead_code)]

use typeflow_core::ir::{Address, OpId, SpaceId, SpaceKind, SpaceManager};
use typeflow_core::{Funcdata, OpCode, TypeFactory, VarnodeId};

pub struct Graph {
    pub types: TypeFactory,
    pub fd: Funcdata,
    pub reg: SpaceId,
    pub ram: SpaceId,
    pub stack: SpaceId,
    next_reg: u64,
    next_op: u64,
}

impl Graph {
    /// A function with register, ram and stack spaces, 8-byte pointers and
    /// one heritage pass over the stack
    pub fn new(name: &str) -> Self {
        let mut spaces = SpaceManager::new();
        let reg = spaces.add_space("register", SpaceKind::Processor, 8, 1).unwrap();
        let ram = spaces.add_space("ram", SpaceKind::Processor, 8, 1).unwrap();
        let stack = spaces.add_space("stack", SpaceKind::Stack, 8, 1).unwrap();
        let mut fd = Funcdata::new(name, spaces, stack);
        fd.set_heritage_pass(stack, 1);
        Self {
            types: TypeFactory::new(8),
            fd,
            reg,
            ram,
            stack,
            next_reg: 0,
            next_op: 0x1000,
        }
    }

    fn fresh_reg(&mut self) -> Address {
        let addr = Address::new(self.reg, self.next_reg);
        self.next_reg += 0x10;
        addr
    }

    pub fn value(&mut self, size: u32) -> VarnodeId {
        let addr = self.fresh_reg();
        self.fd.new_varnode(&mut self.types, size, addr)
    }

    pub fn input(&mut self, size: u32) -> VarnodeId {
        let addr = self.fresh_reg();
        self.fd.new_input(&mut self.types, size, addr)
    }

    pub fn constant(&mut self, size: u32, value: u64) -> VarnodeId {
        self.fd.new_constant(&mut self.types, size, value)
    }

    pub fn stack_value(&mut self, offset: u64, size: u32) -> VarnodeId {
        self.fd.new_varnode(&mut self.types, size, Address::new(self.stack, offset))
    }

    pub fn op(&mut self, opcode: OpCode, inputs: &[VarnodeId], output: Option<VarnodeId>) -> OpId {
        let addr = Address::new(self.ram, self.next_op);
        self.next_op += 4;
        self.fd.new_op(opcode, addr, inputs, output).unwrap()
    }

    /// Define a fresh value of `size` with `opcode`
    pub fn def(&mut self, opcode: OpCode, inputs: &[VarnodeId], size: u32) -> VarnodeId {
        let out = self.value(size);
        self.op(opcode, inputs, Some(out));
        out
    }

    /// Name of the committed type of `vn`
    pub fn committed(&self, vn: VarnodeId) -> String {
        self.types.name(self.fd.varnode(vn).ty()).to_string()
    }
}
