//! The target module: single-assignment functions the lowering emits into.
//!
//! The representation is deliberately small: values are numbered per
//! function, instructions produce zero or more results, and the only control
//! construct is [`Inst::Loop`], which iterates an
//! [`IndexingMap`](kiln_ir::IndexingMap)'s domain while threading
//! accumulator values through its body block. Tensors are values too:
//! [`Inst::Insert`] produces a new tensor rather than mutating one, which is
//! what lets a loop body stay single-assignment while "writing" outputs.
//!
//! Functions are declared before any body is emitted, so calls between
//! subgraph functions resolve regardless of emission order.

use smallvec::SmallVec;

use kiln_ir::{BinaryOp, IndexingMap, UnaryOp};

/// A value in a function body, numbered per function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// A function declared in a [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

/// One instruction. Result values live in the surrounding [`InstData`].
#[derive(Debug, Clone)]
pub enum Inst {
    ConstFloat(f64),

    ConstInt(i64),

    Unary {
        op: UnaryOp,
        operand: ValueId,
    },

    Binary {
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },

    /// Read one tensor element.
    Extract {
        tensor: ValueId,
        indices: SmallVec<[ValueId; 4]>,
    },

    /// Functional tensor update: a new tensor equal to `tensor` with the
    /// element at `indices` replaced by `scalar`.
    Insert {
        scalar: ValueId,
        tensor: ValueId,
        indices: SmallVec<[ValueId; 4]>,
    },

    Call {
        callee: FuncId,
        args: SmallVec<[ValueId; 8]>,
    },

    /// Iterate the valid points of `map`'s domain, threading `inits` through
    /// the body. The body block's arguments are, in order: the domain
    /// variables, the range values the map produces for the current point,
    /// then the current accumulators. The loop's results are the
    /// accumulators yielded by the final iteration.
    Loop {
        map: IndexingMap,
        inits: SmallVec<[ValueId; 2]>,
        body: Block,
    },

    /// Terminate a loop body, passing the next accumulator values.
    Yield {
        values: SmallVec<[ValueId; 2]>,
    },

    /// Terminate a function body.
    Return {
        values: SmallVec<[ValueId; 2]>,
    },
}

/// An instruction together with the values it defines.
#[derive(Debug, Clone)]
pub struct InstData {
    pub inst: Inst,
    pub results: SmallVec<[ValueId; 2]>,
}

/// A straight-line sequence of instructions with block arguments.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub args: SmallVec<[ValueId; 8]>,
    pub insts: Vec<InstData>,
}

/// A declared function; `body` is attached after declaration.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub num_params: usize,
    pub num_results: usize,
    pub body: Option<Block>,
}

/// A module under construction. Function ids stay stable across removals.
#[derive(Debug, Default)]
pub struct Module {
    functions: Vec<Option<Function>>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a function with no body yet.
    pub fn declare_function(&mut self, name: impl Into<String>, num_params: usize, num_results: usize) -> FuncId {
        let id = FuncId(self.functions.len());
        self.functions.push(Some(Function { name: name.into(), num_params, num_results, body: None }));
        id
    }

    /// Remove a declaration. Ids of other functions are unaffected.
    pub fn remove_function(&mut self, id: FuncId) -> Option<Function> {
        self.functions.get_mut(id.0).and_then(Option::take)
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0).and_then(Option::as_ref)
    }

    /// Attach a body to a declared function.
    pub fn attach_body(&mut self, id: FuncId, body: Block) {
        if let Some(Some(function)) = self.functions.get_mut(id.0) {
            function.body = Some(body);
        }
    }

    /// Number of live (declared, not removed) functions.
    pub fn function_count(&self) -> usize {
        self.functions.iter().filter(|f| f.is_some()).count()
    }

    /// Iterate live functions.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter().enumerate().filter_map(|(i, f)| f.as_ref().map(|f| (FuncId(i), f)))
    }
}

/// Arguments handed to a loop body closure by [`FuncBuilder::emit_loop`].
pub struct LoopBodyArgs {
    /// Current domain point, one value per domain variable.
    pub domain: SmallVec<[ValueId; 4]>,
    /// Range values the map produces for the current point.
    pub indices: SmallVec<[ValueId; 4]>,
    /// Current accumulator values.
    pub iter: SmallVec<[ValueId; 2]>,
}

/// Append-only builder for one function body.
///
/// Keeps a stack of open blocks so loop bodies nest; values are numbered
/// across the whole function.
pub struct FuncBuilder {
    next_value: u32,
    blocks: Vec<Block>,
}

impl FuncBuilder {
    /// Start a body whose root block has `num_params` arguments (the
    /// function's formal parameters).
    pub fn new(num_params: usize) -> Self {
        let mut builder = Self { next_value: 0, blocks: Vec::new() };
        let args = (0..num_params).map(|_| builder.fresh()).collect();
        builder.blocks.push(Block { args, insts: Vec::new() });
        builder
    }

    /// The root block's arguments: the function parameters.
    pub fn params(&self) -> SmallVec<[ValueId; 8]> {
        self.blocks[0].args.clone()
    }

    fn fresh(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn push(&mut self, inst: Inst, num_results: usize) -> SmallVec<[ValueId; 2]> {
        let results: SmallVec<[ValueId; 2]> = (0..num_results).map(|_| self.fresh()).collect();
        let block = self.blocks.last_mut().expect("builder has an open block");
        block.insts.push(InstData { inst, results: results.clone() });
        results
    }

    pub fn const_float(&mut self, value: f64) -> ValueId {
        self.push(Inst::ConstFloat(value), 1)[0]
    }

    pub fn const_int(&mut self, value: i64) -> ValueId {
        self.push(Inst::ConstInt(value), 1)[0]
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ValueId) -> ValueId {
        self.push(Inst::Unary { op, operand }, 1)[0]
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Inst::Binary { op, lhs, rhs }, 1)[0]
    }

    pub fn extract(&mut self, tensor: ValueId, indices: SmallVec<[ValueId; 4]>) -> ValueId {
        self.push(Inst::Extract { tensor, indices }, 1)[0]
    }

    pub fn insert(&mut self, scalar: ValueId, tensor: ValueId, indices: SmallVec<[ValueId; 4]>) -> ValueId {
        self.push(Inst::Insert { scalar, tensor, indices }, 1)[0]
    }

    pub fn call(&mut self, callee: FuncId, args: SmallVec<[ValueId; 8]>, num_results: usize) -> SmallVec<[ValueId; 2]> {
        self.push(Inst::Call { callee, args }, num_results)
    }

    /// Emit a loop over `map`'s domain. The closure builds the body from a
    /// fresh block whose arguments carry the domain point, the map's range
    /// values, and the current accumulators; it returns the values to yield
    /// into the next iteration. Returns the loop's results: the final
    /// accumulators.
    pub fn emit_loop<F, E>(
        &mut self,
        map: IndexingMap,
        inits: &[ValueId],
        body: F,
    ) -> Result<SmallVec<[ValueId; 2]>, E>
    where
        F: FnOnce(&mut FuncBuilder, &LoopBodyArgs) -> Result<SmallVec<[ValueId; 2]>, E>,
    {
        let domain: SmallVec<[ValueId; 4]> = (0..map.domain_rank()).map(|_| self.fresh()).collect();
        let indices: SmallVec<[ValueId; 4]> = (0..map.num_results()).map(|_| self.fresh()).collect();
        let iter: SmallVec<[ValueId; 2]> = (0..inits.len()).map(|_| self.fresh()).collect();

        let mut args: SmallVec<[ValueId; 8]> = SmallVec::new();
        args.extend(domain.iter().copied());
        args.extend(indices.iter().copied());
        args.extend(iter.iter().copied());
        self.blocks.push(Block { args, insts: Vec::new() });

        let body_args = LoopBodyArgs { domain, indices, iter };
        match body(self, &body_args) {
            Ok(yielded) => {
                self.push(Inst::Yield { values: yielded }, 0);
                let block = self.blocks.pop().expect("loop body block is open");
                Ok(self.push(Inst::Loop { map, inits: inits.iter().copied().collect(), body: block }, inits.len()))
            }
            Err(error) => {
                // Abandon the half-built body; the module is discarded by the
                // caller on failure anyway.
                self.blocks.pop();
                Err(error)
            }
        }
    }

    /// Terminate the function body.
    pub fn ret(&mut self, values: SmallVec<[ValueId; 2]>) {
        self.push(Inst::Return { values }, 0);
    }

    /// Finish and hand back the completed root block.
    pub fn finish(mut self) -> Block {
        debug_assert_eq!(self.blocks.len(), 1, "all loop bodies must be closed");
        self.blocks.pop().expect("builder has a root block")
    }
}
