//! Reference interpreter for emitted modules.
//!
//! Executes a [`Module`](crate::module::Module) function on concrete tensor
//! values with the exact semantics the emitted constructs promise: a
//! [`Loop`](crate::module::Inst::Loop) enumerates the valid points of its
//! map's domain in the pinned order, threading accumulators; an
//! [`Insert`](crate::module::Inst::Insert) produces a new tensor value. This
//! is what ties the lowering's structural guarantees to observable behavior
//! in tests.

use std::collections::HashMap;

use smallvec::SmallVec;
use snafu::{OptionExt, Snafu, ensure};

use crate::module::{Block, FuncId, Inst, Module, ValueId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("function {id} is not declared"))]
    UnknownFunction { id: usize },

    #[snafu(display("function {name} has no body"))]
    MissingBody { name: String },

    #[snafu(display("function {name} expects {expected} arguments, got {actual}"))]
    ArgumentCount { name: String, expected: usize, actual: usize },

    #[snafu(display("value v{id} is undefined"))]
    UndefinedValue { id: u32 },

    #[snafu(display("value v{id} is not a {expected}"))]
    TypeMismatch { id: u32, expected: &'static str },

    #[snafu(display("index {indices:?} out of bounds for tensor of shape {dims:?}"))]
    IndexOutOfBounds { indices: Vec<i64>, dims: Vec<i64> },

    #[snafu(display("tensor data length {len} does not match shape {dims:?}"))]
    DataShapeMismatch { len: usize, dims: Vec<i64> },

    #[snafu(display("block terminated without yielding values"))]
    MissingTerminator,
}

/// A concrete tensor: row-major `f64` data.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    dims: SmallVec<[i64; 4]>,
    data: Vec<f64>,
}

impl TensorValue {
    pub fn new(dims: &[i64], data: Vec<f64>) -> Result<Self> {
        let expected: i64 = dims.iter().product();
        ensure!(data.len() as i64 == expected, DataShapeMismatchSnafu { len: data.len(), dims: dims.to_vec() });
        Ok(Self { dims: dims.iter().copied().collect(), data })
    }

    pub fn zeros(dims: &[i64]) -> Self {
        let len: i64 = dims.iter().product();
        Self { dims: dims.iter().copied().collect(), data: vec![0.0; len.max(0) as usize] }
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn linear_index(&self, indices: &[i64]) -> Result<usize> {
        let in_bounds = indices.len() == self.dims.len()
            && indices.iter().zip(&self.dims).all(|(&i, &d)| 0 <= i && i < d);
        ensure!(in_bounds, IndexOutOfBoundsSnafu { indices: indices.to_vec(), dims: self.dims.to_vec() });
        let mut linear = 0usize;
        for (&index, &dim) in indices.iter().zip(&self.dims) {
            linear = linear * dim as usize + index as usize;
        }
        Ok(linear)
    }

    pub fn get(&self, indices: &[i64]) -> Result<f64> {
        Ok(self.data[self.linear_index(indices)?])
    }

    /// Functional update: a new tensor with one element replaced.
    pub fn with_element(&self, indices: &[i64], value: f64) -> Result<Self> {
        let linear = self.linear_index(indices)?;
        let mut updated = self.clone();
        updated.data[linear] = value;
        Ok(updated)
    }
}

/// A runtime value: an index, a scalar, or a tensor.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Tensor(TensorValue),
}

impl Value {
    fn as_int(&self, id: ValueId) -> Result<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            _ => TypeMismatchSnafu { id: id.0, expected: "integer" }.fail(),
        }
    }

    fn as_float(&self, id: ValueId) -> Result<f64> {
        match self {
            Self::Float(v) => Ok(*v),
            _ => TypeMismatchSnafu { id: id.0, expected: "scalar" }.fail(),
        }
    }

    fn as_tensor(&self, id: ValueId) -> Result<&TensorValue> {
        match self {
            Self::Tensor(v) => Ok(v),
            _ => TypeMismatchSnafu { id: id.0, expected: "tensor" }.fail(),
        }
    }
}

/// Call a function of `module` with the given arguments and return the
/// values of its terminator.
pub fn call_function(module: &Module, func: FuncId, args: Vec<Value>) -> Result<Vec<Value>> {
    let function = module.function(func).context(UnknownFunctionSnafu { id: func.0 })?;
    ensure!(
        args.len() == function.num_params,
        ArgumentCountSnafu { name: function.name.clone(), expected: function.num_params, actual: args.len() }
    );
    let body = function.body.as_ref().context(MissingBodySnafu { name: function.name.clone() })?;
    run_block(module, body, args, &HashMap::new())
}

/// Execute a block with the given block-argument values, returning the
/// values of its `Return`/`Yield` terminator.
///
/// `outer` is the environment of the enclosing block: a loop body may
/// reference any value defined before the loop, so the body's environment
/// starts as an extension of its parent's.
fn run_block(module: &Module, block: &Block, args: Vec<Value>, outer: &HashMap<ValueId, Value>) -> Result<Vec<Value>> {
    let mut env: HashMap<ValueId, Value> = outer.clone();
    env.extend(block.args.iter().copied().zip(args));

    let lookup = |env: &HashMap<ValueId, Value>, id: ValueId| -> Result<Value> {
        env.get(&id).cloned().context(UndefinedValueSnafu { id: id.0 })
    };

    for inst_data in &block.insts {
        let result = |i: usize| inst_data.results[i];
        match &inst_data.inst {
            Inst::ConstFloat(value) => {
                env.insert(result(0), Value::Float(*value));
            }
            Inst::ConstInt(value) => {
                env.insert(result(0), Value::Int(*value));
            }
            Inst::Unary { op, operand } => {
                let x = lookup(&env, *operand)?.as_float(*operand)?;
                env.insert(result(0), Value::Float(op.apply(x)));
            }
            Inst::Binary { op, lhs, rhs } => {
                let l = lookup(&env, *lhs)?.as_float(*lhs)?;
                let r = lookup(&env, *rhs)?.as_float(*rhs)?;
                env.insert(result(0), Value::Float(op.apply(l, r)));
            }
            Inst::Extract { tensor, indices } => {
                let indices = resolve_indices(&env, indices)?;
                let value = lookup(&env, *tensor)?.as_tensor(*tensor)?.get(&indices)?;
                env.insert(result(0), Value::Float(value));
            }
            Inst::Insert { scalar, tensor, indices } => {
                let indices = resolve_indices(&env, indices)?;
                let value = lookup(&env, *scalar)?.as_float(*scalar)?;
                let updated = lookup(&env, *tensor)?.as_tensor(*tensor)?.with_element(&indices, value)?;
                env.insert(result(0), Value::Tensor(updated));
            }
            Inst::Call { callee, args } => {
                let arg_values = args.iter().map(|&arg| lookup(&env, arg)).collect::<Result<Vec<_>>>()?;
                let results = call_function(module, *callee, arg_values)?;
                for (i, value) in results.into_iter().enumerate() {
                    env.insert(result(i), value);
                }
            }
            Inst::Loop { map, inits, body } => {
                let mut accumulators =
                    inits.iter().map(|&init| lookup(&env, init)).collect::<Result<Vec<_>>>()?;
                for point in map.points() {
                    let indices = map.apply(&point);
                    let mut body_args: Vec<Value> = Vec::with_capacity(body.args.len());
                    body_args.extend(point.iter().map(|&d| Value::Int(d)));
                    body_args.extend(indices.iter().map(|&i| Value::Int(i)));
                    body_args.extend(accumulators.iter().cloned());
                    accumulators = run_block(module, body, body_args, &env)?;
                }
                for (i, value) in accumulators.into_iter().enumerate() {
                    env.insert(result(i), value);
                }
            }
            Inst::Yield { values } | Inst::Return { values } => {
                return values.iter().map(|&value| lookup(&env, value)).collect();
            }
        }
    }

    MissingTerminatorSnafu.fail()
}

fn resolve_indices(env: &HashMap<ValueId, Value>, indices: &[ValueId]) -> Result<SmallVec<[i64; 4]>> {
    indices
        .iter()
        .map(|&id| env.get(&id).context(UndefinedValueSnafu { id: id.0 })?.as_int(id))
        .collect()
}
