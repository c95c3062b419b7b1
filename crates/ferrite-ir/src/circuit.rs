//! Arena-based circuit representation
//!
//! A [`Circuit`] owns a list of [`Module`]s; each module owns its
//! operations and values in flat arenas addressed by stable integer
//! handles. Cross-module structure (instantiation) is expressed through
//! [`OpKind::Instance`] referencing a [`ModuleId`]; there are no embedded
//! back-pointers, so modules can be mutated independently once analysis
//! state is frozen.
//!
//! Def-use information is kept as per-value user adjacency lists,
//! maintained by the builder and mutation methods.

use smallvec::SmallVec;

use crate::attr::{Attr, IntAttr};
use crate::loc::SourceLoc;
use crate::ops::{NameKind, OpKind, PrimOp, TypeError};
use crate::types::Type;

/// Handle to a module within a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// Handle to a value. Values are owned by the module that defines them;
/// the handle is globally unique within one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId {
    pub module: ModuleId,
    pub index: u32,
}

/// Handle to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId {
    pub module: ModuleId,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// Declared module port.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub direction: Direction,
    pub ty: Type,
    pub value: ValueId,
}

/// Port declaration used when creating a module.
#[derive(Debug, Clone)]
pub struct PortDecl {
    pub name: String,
    pub direction: Direction,
    pub ty: Type,
}

impl PortDecl {
    pub fn input(name: impl Into<String>, ty: Type) -> Self {
        PortDecl {
            name: name.into(),
            direction: Direction::In,
            ty,
        }
    }

    pub fn output(name: impl Into<String>, ty: Type) -> Self {
        PortDecl {
            name: name.into(),
            direction: Direction::Out,
            ty,
        }
    }
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// The module's port at the given index.
    Port { index: u32 },
    /// The n-th result of an operation.
    OpResult { op: OpId, index: u32 },
}

#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub ty: Type,
    pub def: ValueDef,
    users: SmallVec<[OpId; 4]>,
    protected: bool,
}

/// One operation in a module body.
#[derive(Debug, Clone)]
pub struct Op {
    pub kind: OpKind,
    pub operands: SmallVec<[ValueId; 2]>,
    pub results: SmallVec<[ValueId; 1]>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Module with a body defined in this circuit.
    Concrete,
    /// Opaque definition: ports only, body elsewhere.
    External,
}

#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    pub name: String,
    pub kind: ModuleKind,
    /// Public modules are visible at the circuit boundary; their ports can
    /// be driven and observed by unknown callers.
    pub public: bool,
    ports: Vec<Port>,
    values: Vec<ValueInfo>,
    ops: Vec<Option<Op>>,
    body: Vec<u32>,
}

impl Module {
    fn new(id: ModuleId, name: String, kind: ModuleKind, public: bool, decls: Vec<PortDecl>) -> Self {
        let mut module = Module {
            id,
            name,
            kind,
            public,
            ports: Vec::new(),
            values: Vec::new(),
            ops: Vec::new(),
            body: Vec::new(),
        };
        for decl in decls {
            let index = module.ports.len() as u32;
            let value = module.new_value(decl.ty.clone(), ValueDef::Port { index });
            module.ports.push(Port {
                name: decl.name,
                direction: decl.direction,
                ty: decl.ty,
                value,
            });
        }
        module
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port_direction(&self, index: usize) -> Direction {
        self.ports[index].direction
    }

    pub fn find_port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Operations in body order.
    pub fn body(&self) -> impl Iterator<Item = OpId> + '_ {
        let module = self.id;
        self.body.iter().map(move |&index| OpId { module, index })
    }

    pub fn op(&self, id: OpId) -> &Op {
        assert_eq!(id.module, self.id, "op handle from another module");
        self.ops[id.index as usize]
            .as_ref()
            .expect("op has been erased")
    }

    pub fn value(&self, id: ValueId) -> &ValueInfo {
        assert_eq!(id.module, self.id, "value handle from another module");
        &self.values[id.index as usize]
    }

    pub fn value_type(&self, id: ValueId) -> &Type {
        &self.value(id).ty
    }

    /// Operations using the value as an operand. An op using it in several
    /// operand slots appears once per slot.
    pub fn users(&self, id: ValueId) -> &[OpId] {
        &self.value(id).users
    }

    pub fn has_uses(&self, id: ValueId) -> bool {
        !self.value(id).users.is_empty()
    }

    pub fn is_protected(&self, id: ValueId) -> bool {
        self.value(id).protected
    }

    pub fn set_protected(&mut self, id: ValueId) {
        assert_eq!(id.module, self.id);
        self.values[id.index as usize].protected = true;
    }

    /// The defining operation, or `None` for port values.
    pub fn defining_op(&self, id: ValueId) -> Option<OpId> {
        match self.value(id).def {
            ValueDef::Port { .. } => None,
            ValueDef::OpResult { op, .. } => Some(op),
        }
    }

    /// Walk through aggregate accessors to the underlying declaration.
    pub fn aggregate_root(&self, mut id: ValueId) -> ValueId {
        while let Some(op) = self.defining_op(id) {
            match self.op(op).kind {
                OpKind::Subfield { .. } | OpKind::Subindex { .. } => {
                    id = self.op(op).operands[0];
                }
                _ => break,
            }
        }
        id
    }

    fn new_value(&mut self, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId {
            module: self.id,
            index: self.values.len() as u32,
        };
        self.values.push(ValueInfo {
            ty,
            def,
            users: SmallVec::new(),
            protected: false,
        });
        id
    }

    fn push_op(
        &mut self,
        kind: OpKind,
        operands: SmallVec<[ValueId; 2]>,
        result_tys: &[Type],
    ) -> OpId {
        let op = OpId {
            module: self.id,
            index: self.ops.len() as u32,
        };
        for &operand in &operands {
            assert_eq!(operand.module, self.id, "operand from another module");
            self.values[operand.index as usize].users.push(op);
        }
        let results = result_tys
            .iter()
            .enumerate()
            .map(|(i, ty)| self.new_value(ty.clone(), ValueDef::OpResult { op, index: i as u32 }))
            .collect();
        self.ops.push(Some(Op {
            kind,
            operands,
            results,
            loc: SourceLoc::Unknown,
        }));
        self.body.push(op.index);
        op
    }

    /// Insert an already-shaped op at the front of the body. Used by
    /// rewriters to materialize constants at a dominating position.
    pub fn prepend_op(&mut self, kind: OpKind, result_ty: Type, loc: SourceLoc) -> OpId {
        let op = OpId {
            module: self.id,
            index: self.ops.len() as u32,
        };
        let result = self.new_value(result_ty, ValueDef::OpResult { op, index: 0 });
        self.ops.push(Some(Op {
            kind,
            operands: SmallVec::new(),
            results: smallvec::smallvec![result],
            loc,
        }));
        self.body.insert(0, op.index);
        op
    }

    pub fn set_loc(&mut self, id: OpId, loc: SourceLoc) {
        assert_eq!(id.module, self.id);
        self.ops[id.index as usize]
            .as_mut()
            .expect("op has been erased")
            .loc = loc;
    }

    pub fn fuse_loc(&mut self, id: OpId, loc: SourceLoc) {
        assert_eq!(id.module, self.id);
        let op = self.ops[id.index as usize]
            .as_mut()
            .expect("op has been erased");
        op.loc = std::mem::take(&mut op.loc).fuse(loc);
    }

    /// Erase an operation. Its results must be unused.
    pub fn erase_op(&mut self, id: OpId) {
        assert_eq!(id.module, self.id);
        let op = self.ops[id.index as usize]
            .take()
            .expect("op already erased");
        for result in &op.results {
            assert!(
                self.values[result.index as usize].users.is_empty(),
                "erasing op whose result still has uses"
            );
        }
        for operand in &op.operands {
            self.values[operand.index as usize]
                .users
                .retain(|user| *user != id);
        }
        self.body.retain(|&index| index != id.index);
    }

    /// Replace uses of `from` with `to` wherever `keep` approves the
    /// (user op, operand slot) pair. Returns the number of slots rewritten.
    pub fn replace_uses_where(
        &mut self,
        from: ValueId,
        to: ValueId,
        keep: impl Fn(&Op, usize) -> bool,
    ) -> usize {
        assert_eq!(from.module, self.id);
        assert_eq!(to.module, self.id);
        if from == to {
            return 0;
        }
        let users: Vec<OpId> = self.value(from).users.to_vec();
        let mut replaced = 0;
        for user in users {
            let op_ref = self.ops[user.index as usize]
                .as_ref()
                .expect("user list points at erased op");
            let slots: Vec<usize> = op_ref
                .operands
                .iter()
                .enumerate()
                .filter(|&(slot, &operand)| operand == from && keep(op_ref, slot))
                .map(|(slot, _)| slot)
                .collect();
            if slots.is_empty() {
                continue;
            }
            let op_mut = self.ops[user.index as usize].as_mut().unwrap();
            for &slot in &slots {
                op_mut.operands[slot] = to;
            }
            // One user-list entry per rewritten slot moves from `from` to `to`.
            for _ in &slots {
                let pos = self.values[from.index as usize]
                    .users
                    .iter()
                    .position(|&u| u == user)
                    .expect("user list out of sync");
                self.values[from.index as usize].users.remove(pos);
                self.values[to.index as usize].users.push(user);
            }
            replaced += slots.len();
        }
        replaced
    }
}

/// A complete design: a named collection of modules.
#[derive(Debug)]
pub struct Circuit {
    pub name: String,
    modules: Vec<Module>,
}

impl Circuit {
    pub fn new(name: impl Into<String>) -> Self {
        Circuit {
            name: name.into(),
            modules: Vec::new(),
        }
    }

    pub fn add_module(&mut self, name: impl Into<String>, public: bool, ports: Vec<PortDecl>) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules
            .push(Module::new(id, name.into(), ModuleKind::Concrete, public, ports));
        id
    }

    /// Declare an opaque module: ports visible, body defined elsewhere.
    pub fn add_extern_module(&mut self, name: impl Into<String>, ports: Vec<PortDecl>) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules
            .push(Module::new(id, name.into(), ModuleKind::External, false, ports));
        id
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0 as usize]
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Mutable access to all modules at once; rewrite phases iterate this
    /// in parallel since each module only touches its own arenas.
    pub fn modules_mut(&mut self) -> &mut [Module] {
        &mut self.modules
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().find(|m| m.name == name).map(|m| m.id)
    }

    /// Total number of values across all modules.
    pub fn num_values(&self) -> usize {
        self.modules.iter().map(|m| m.values.len()).sum()
    }

    pub fn op(&self, id: OpId) -> &Op {
        self.module(id.module).op(id)
    }

    pub fn value_type(&self, id: ValueId) -> &Type {
        self.module(id.module).value_type(id)
    }

    pub fn users(&self, id: ValueId) -> &[OpId] {
        self.module(id.module).users(id)
    }

    pub fn defining_op(&self, id: ValueId) -> Option<OpId> {
        self.module(id.module).defining_op(id)
    }

    pub fn is_protected(&self, id: ValueId) -> bool {
        self.module(id.module).is_protected(id)
    }

    pub fn set_protected(&mut self, id: ValueId) {
        self.module_mut(id.module).set_protected(id)
    }

    pub fn set_loc(&mut self, id: OpId, loc: SourceLoc) {
        self.module_mut(id.module).set_loc(id, loc)
    }

    pub fn erase_op(&mut self, id: OpId) {
        self.module_mut(id.module).erase_op(id)
    }

    // --- op builders -----------------------------------------------------

    pub fn add_constant(&mut self, module: ModuleId, attr: IntAttr) -> ValueId {
        let ty = attr.ty().clone();
        let op = self
            .module_mut(module)
            .push_op(OpKind::Constant(attr), SmallVec::new(), &[ty]);
        self.op(op).results[0]
    }

    pub fn add_invalid(&mut self, module: ModuleId, ty: Type) -> ValueId {
        let op = self
            .module_mut(module)
            .push_op(OpKind::Invalid, SmallVec::new(), &[ty]);
        self.op(op).results[0]
    }

    pub fn add_wire(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        ty: Type,
        name_kind: NameKind,
    ) -> ValueId {
        let kind = OpKind::Wire {
            name: name.into(),
            name_kind,
        };
        let op = self.module_mut(module).push_op(kind, SmallVec::new(), &[ty]);
        self.op(op).results[0]
    }

    pub fn add_reg(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        ty: Type,
        clock: ValueId,
        name_kind: NameKind,
    ) -> ValueId {
        let kind = OpKind::Reg {
            name: name.into(),
            name_kind,
        };
        let op = self
            .module_mut(module)
            .push_op(kind, smallvec::smallvec![clock], &[ty]);
        self.op(op).results[0]
    }

    pub fn add_reg_reset(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        ty: Type,
        clock: ValueId,
        reset_signal: ValueId,
        reset_value: ValueId,
        name_kind: NameKind,
    ) -> ValueId {
        let kind = OpKind::RegReset {
            name: name.into(),
            name_kind,
        };
        let op = self.module_mut(module).push_op(
            kind,
            smallvec::smallvec![clock, reset_signal, reset_value],
            &[ty],
        );
        self.op(op).results[0]
    }

    pub fn add_node(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        input: ValueId,
        name_kind: NameKind,
    ) -> ValueId {
        let ty = self.value_type(input).clone();
        let kind = OpKind::Node {
            name: name.into(),
            name_kind,
        };
        let op = self
            .module_mut(module)
            .push_op(kind, smallvec::smallvec![input], &[ty]);
        self.op(op).results[0]
    }

    /// Instantiate `target` inside `module`. One result per target port,
    /// in port order; results for input ports are connect destinations.
    pub fn add_instance(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        target: ModuleId,
    ) -> OpId {
        self.add_instance_with_params(module, name, target, Vec::new())
    }

    pub fn add_instance_with_params(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        target: ModuleId,
        params: Vec<(String, Attr)>,
    ) -> OpId {
        let result_tys: Vec<Type> = self
            .module(target)
            .ports()
            .iter()
            .map(|p| p.ty.clone())
            .collect();
        let kind = OpKind::Instance {
            name: name.into(),
            target,
            params,
        };
        self.module_mut(module).push_op(kind, SmallVec::new(), &result_tys)
    }

    /// A memory with one bundle-typed result per access port.
    pub fn add_mem(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        port_tys: Vec<Type>,
    ) -> OpId {
        let kind = OpKind::Mem { name: name.into() };
        self.module_mut(module).push_op(kind, SmallVec::new(), &port_tys)
    }

    pub fn add_connect(&mut self, module: ModuleId, dest: ValueId, src: ValueId) -> OpId {
        self.module_mut(module)
            .push_op(OpKind::Connect, smallvec::smallvec![dest, src], &[])
    }

    pub fn add_prim(
        &mut self,
        module: ModuleId,
        prim: PrimOp,
        operands: &[ValueId],
    ) -> Result<ValueId, TypeError> {
        let operand_tys: Vec<Type> = operands.iter().map(|&v| self.value_type(v).clone()).collect();
        let result_ty = prim.result_type(&operand_tys)?;
        let op = self.module_mut(module).push_op(
            OpKind::Prim(prim),
            SmallVec::from_slice(operands),
            &[result_ty],
        );
        Ok(self.op(op).results[0])
    }

    pub fn add_subfield(
        &mut self,
        module: ModuleId,
        input: ValueId,
        index: usize,
    ) -> Result<ValueId, TypeError> {
        let input_ty = self.value_type(input).clone();
        let field_ty = input_ty
            .field(index)
            .map(|f| f.ty.clone())
            .ok_or_else(|| TypeError::NoField {
                ty: input_ty.clone(),
                index,
            })?;
        let op = self.module_mut(module).push_op(
            OpKind::Subfield { index },
            smallvec::smallvec![input],
            &[field_ty],
        );
        Ok(self.op(op).results[0])
    }

    pub fn add_subindex(
        &mut self,
        module: ModuleId,
        input: ValueId,
        index: usize,
    ) -> Result<ValueId, TypeError> {
        let input_ty = self.value_type(input).clone();
        let elem_ty = input_ty
            .element()
            .cloned()
            .ok_or_else(|| TypeError::NotVector(input_ty.clone()))?;
        let op = self.module_mut(module).push_op(
            OpKind::Subindex { index },
            smallvec::smallvec![input],
            &[elem_ty],
        );
        Ok(self.op(op).results[0])
    }
}
