//! Call schemas and argument binding shared by every realization of an operation.
//!
//! A [`Schema`] is the single source of truth for an operation's signature. Eager callers and
//! lowering callers both go through [`Schema::bind`], which resolves positional and keyword
//! arguments, fills defaults, and type-checks each value before a realization sees it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PrimError, PrimResult};
use crate::tensor::DType;

/// Declared kind of a schema argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgType {
    Tensor,
    Int,
    Bool,
    /// Integer list; `len` renders as `int[len]` and allows a bare int to be passed.
    IntList { len: Option<usize> },
    /// Target tensor shape.
    Shape,
    DType,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Tensor => f.write_str("Tensor"),
            ArgType::Int => f.write_str("int"),
            ArgType::Bool => f.write_str("bool"),
            ArgType::IntList { len: None } => f.write_str("int[]"),
            ArgType::IntList { len: Some(len) } => write!(f, "int[{len}]"),
            ArgType::Shape => f.write_str("SymInt[]"),
            ArgType::DType => f.write_str("ScalarType"),
        }
    }
}

/// Default value of an optional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgDefault {
    None,
    Bool(bool),
    Int(i64),
}

impl ArgDefault {
    fn to_arg<T>(self) -> Arg<T> {
        match self {
            ArgDefault::None => Arg::None,
            ArgDefault::Bool(value) => Arg::Bool(value),
            ArgDefault::Int(value) => Arg::Int(value),
        }
    }
}

impl fmt::Display for ArgDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgDefault::None => f.write_str("None"),
            ArgDefault::Bool(true) => f.write_str("True"),
            ArgDefault::Bool(false) => f.write_str("False"),
            ArgDefault::Int(value) => write!(f, "{value}"),
        }
    }
}

/// One formal parameter of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
    pub optional: bool,
    pub default: Option<ArgDefault>,
    pub kw_only: bool,
}

impl ArgSpec {
    pub const fn new(name: &'static str, ty: ArgType) -> Self {
        Self {
            name,
            ty,
            optional: false,
            default: None,
            kw_only: false,
        }
    }

    pub const fn tensor(name: &'static str) -> Self {
        Self::new(name, ArgType::Tensor)
    }

    /// Marks the argument as accepting `None`.
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub const fn with_default(mut self, default: ArgDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Marks the argument as keyword-only (after `*` in the rendered schema).
    pub const fn keyword_only(mut self) -> Self {
        self.kw_only = true;
        self
    }
}

impl fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if self.optional {
            f.write_str("?")?;
        }
        write!(f, " {}", self.name)?;
        if let Some(default) = self.default {
            write!(f, "={default}")?;
        }
        Ok(())
    }
}

/// Result arity declared by a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Returns {
    Tensor,
    TensorPair,
}

impl Returns {
    pub fn arity(self) -> usize {
        match self {
            Returns::Tensor => 1,
            Returns::TensorPair => 2,
        }
    }
}

impl fmt::Display for Returns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Returns::Tensor => f.write_str("Tensor"),
            Returns::TensorPair => f.write_str("(Tensor, Tensor)"),
        }
    }
}

/// Operation signature: name, optional overload name, formal arguments and returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Schema {
    pub name: String,
    pub overload: Option<String>,
    pub args: Vec<ArgSpec>,
    pub returns: Returns,
}

impl Schema {
    pub fn new(name: impl Into<String>, args: Vec<ArgSpec>, returns: Returns) -> Self {
        Self {
            name: name.into(),
            overload: None,
            args,
            returns,
        }
    }

    pub fn with_overload(mut self, overload: impl Into<String>) -> Self {
        self.overload = Some(overload.into());
        self
    }

    /// `name` or `name.overload`.
    pub fn full_name(&self) -> String {
        match &self.overload {
            Some(overload) => format!("{}.{}", self.name, overload),
            None => self.name.clone(),
        }
    }

    /// Two schemas are call-compatible when arguments and returns agree exactly.
    pub fn same_signature(&self, other: &Schema) -> bool {
        self.args == other.args && self.returns == other.returns
    }

    /// Binds a call against this schema.
    pub fn bind<T>(&self, call: CallArgs<T>) -> PrimResult<BoundArgs<T>> {
        let positional_capacity = self.args.iter().filter(|arg| !arg.kw_only).count();
        if call.positional.len() > positional_capacity {
            return Err(self.error(format!(
                "expected at most {} positional argument(s), got {}",
                positional_capacity,
                call.positional.len()
            )));
        }

        let mut slots: Vec<Option<Arg<T>>> = (0..self.args.len()).map(|_| None).collect();
        for (slot, value) in slots.iter_mut().zip(call.positional) {
            *slot = Some(value);
        }
        for (name, value) in call.keywords {
            let index = self
                .args
                .iter()
                .position(|arg| arg.name == name)
                .ok_or_else(|| self.error(format!("unexpected keyword argument `{name}`")))?;
            if slots[index].is_some() {
                return Err(self.error(format!("got multiple values for argument `{name}`")));
            }
            slots[index] = Some(value);
        }

        let mut values = Vec::with_capacity(self.args.len());
        for (spec, slot) in self.args.iter().zip(slots) {
            let value = match (slot, spec.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.to_arg(),
                (None, None) => {
                    return Err(self.error(format!("missing required argument `{}`", spec.name)))
                }
            };
            let value = self.check_arg(spec, value)?;
            values.push((spec.name, value));
        }

        Ok(BoundArgs {
            schema: self.full_name(),
            values,
        })
    }

    fn check_arg<T>(&self, spec: &ArgSpec, value: Arg<T>) -> PrimResult<Arg<T>> {
        let value = match (spec.ty, value) {
            (_, Arg::None) if spec.optional => Arg::None,
            (ArgType::Tensor, value @ Arg::Tensor(_)) => value,
            (ArgType::Int, value @ Arg::Int(_)) => value,
            (ArgType::Bool, value @ Arg::Bool(_)) => value,
            (ArgType::IntList { len: Some(1) }, Arg::Int(value)) => Arg::IntList(vec![value]),
            (ArgType::IntList { .. } | ArgType::Shape, value @ Arg::IntList(_)) => value,
            (ArgType::DType, value @ Arg::DType(_)) => value,
            (ty, value) => {
                return Err(self.error(format!(
                    "argument `{}` expects {}{}, got {}",
                    spec.name,
                    ty,
                    if spec.optional { "?" } else { "" },
                    value.kind_name()
                )))
            }
        };
        if let (ArgType::Shape, Arg::IntList(dims)) = (spec.ty, &value) {
            if let Some(negative) = dims.iter().find(|dim| **dim < 0) {
                return Err(self.error(format!(
                    "argument `{}` has negative extent {negative}",
                    spec.name
                )));
            }
        }
        Ok(value)
    }

    fn error(&self, detail: String) -> PrimError {
        PrimError::Schema {
            schema: self.to_string(),
            detail,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.full_name())?;
        let mut first = true;
        let mut keyword_marker_written = false;
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            if arg.kw_only && !keyword_marker_written {
                f.write_str("*, ")?;
                keyword_marker_written = true;
            }
            write!(f, "{arg}")?;
            first = false;
        }
        write!(f, ") -> {}", self.returns)
    }
}

/// Actual argument value. `T` is the tensor representation: host tensors for eager calls,
/// symbolic nodes for lowering calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<T> {
    Tensor(T),
    Int(i64),
    Bool(bool),
    IntList(Vec<i64>),
    DType(DType),
    None,
}

impl<T> Arg<T> {
    fn kind_name(&self) -> &'static str {
        match self {
            Arg::Tensor(_) => "Tensor",
            Arg::Int(_) => "int",
            Arg::Bool(_) => "bool",
            Arg::IntList(_) => "int[]",
            Arg::DType(_) => "ScalarType",
            Arg::None => "None",
        }
    }
}

/// Conversion into an [`Arg`] for a given tensor representation.
pub trait IntoArg<T> {
    fn into_arg(self) -> Arg<T>;
}

impl<T> IntoArg<T> for Arg<T> {
    fn into_arg(self) -> Arg<T> {
        self
    }
}

impl IntoArg<crate::tensor::Tensor> for crate::tensor::Tensor {
    fn into_arg(self) -> Arg<crate::tensor::Tensor> {
        Arg::Tensor(self)
    }
}

impl IntoArg<crate::tensor::Tensor> for &crate::tensor::Tensor {
    fn into_arg(self) -> Arg<crate::tensor::Tensor> {
        Arg::Tensor(self.clone())
    }
}

impl IntoArg<crate::fusion::FusionTensor> for crate::fusion::FusionTensor {
    fn into_arg(self) -> Arg<crate::fusion::FusionTensor> {
        Arg::Tensor(self)
    }
}

impl IntoArg<crate::fusion::FusionTensor> for &crate::fusion::FusionTensor {
    fn into_arg(self) -> Arg<crate::fusion::FusionTensor> {
        Arg::Tensor(self.clone())
    }
}

impl<T> IntoArg<T> for i64 {
    fn into_arg(self) -> Arg<T> {
        Arg::Int(self)
    }
}

impl<T> IntoArg<T> for bool {
    fn into_arg(self) -> Arg<T> {
        Arg::Bool(self)
    }
}

impl<T> IntoArg<T> for DType {
    fn into_arg(self) -> Arg<T> {
        Arg::DType(self)
    }
}

impl<T> IntoArg<T> for Vec<i64> {
    fn into_arg(self) -> Arg<T> {
        Arg::IntList(self)
    }
}

impl<T> IntoArg<T> for &[i64] {
    fn into_arg(self) -> Arg<T> {
        Arg::IntList(self.to_vec())
    }
}

impl<T, const N: usize> IntoArg<T> for [i64; N] {
    fn into_arg(self) -> Arg<T> {
        Arg::IntList(self.to_vec())
    }
}

impl<T> IntoArg<T> for &[usize] {
    fn into_arg(self) -> Arg<T> {
        Arg::IntList(self.iter().map(|&dim| dim as i64).collect())
    }
}

impl<T, V: IntoArg<T>> IntoArg<T> for Option<V> {
    fn into_arg(self) -> Arg<T> {
        match self {
            Some(value) => value.into_arg(),
            None => Arg::None,
        }
    }
}

/// Unbound call: positional values followed by keyword values.
#[derive(Debug, Clone)]
pub struct CallArgs<T> {
    positional: Vec<Arg<T>>,
    keywords: Vec<(String, Arg<T>)>,
}

impl<T> Default for CallArgs<T> {
    fn default() -> Self {
        Self {
            positional: Vec::new(),
            keywords: Vec::new(),
        }
    }
}

impl<T> CallArgs<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl IntoArg<T>) -> Self {
        self.positional.push(value.into_arg());
        self
    }

    pub fn kwarg(mut self, name: &str, value: impl IntoArg<T>) -> Self {
        self.keywords.push((name.to_string(), value.into_arg()));
        self
    }
}

/// Arguments resolved against a schema, in declaration order.
#[derive(Debug, Clone)]
pub struct BoundArgs<T> {
    schema: String,
    values: Vec<(&'static str, Arg<T>)>,
}

impl<T> BoundArgs<T> {
    /// Full name of the schema these arguments were bound against.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&Arg<T>> {
        self.values
            .iter()
            .find(|(arg, _)| *arg == name)
            .map(|(_, value)| value)
    }

    /// Iterates over every tensor argument.
    pub fn tensors(&self) -> impl Iterator<Item = &T> {
        self.values.iter().filter_map(|(_, value)| match value {
            Arg::Tensor(tensor) => Some(tensor),
            _ => None,
        })
    }

    fn lookup(&self, name: &str) -> PrimResult<&Arg<T>> {
        self.get(name).ok_or_else(|| PrimError::Schema {
            schema: self.schema.clone(),
            detail: format!("no argument named `{name}`"),
        })
    }

    fn mismatch(&self, name: &str, expected: &str) -> PrimError {
        PrimError::Schema {
            schema: self.schema.clone(),
            detail: format!("argument `{name}` is not {expected}"),
        }
    }

    pub fn tensor(&self, name: &str) -> PrimResult<&T> {
        match self.lookup(name)? {
            Arg::Tensor(tensor) => Ok(tensor),
            _ => Err(self.mismatch(name, "a tensor")),
        }
    }

    pub fn int(&self, name: &str) -> PrimResult<i64> {
        self.opt_int(name)?
            .ok_or_else(|| self.mismatch(name, "an int"))
    }

    pub fn opt_int(&self, name: &str) -> PrimResult<Option<i64>> {
        match self.lookup(name)? {
            Arg::Int(value) => Ok(Some(*value)),
            Arg::None => Ok(None),
            _ => Err(self.mismatch(name, "an int")),
        }
    }

    pub fn bool(&self, name: &str) -> PrimResult<bool> {
        self.opt_bool(name)?
            .ok_or_else(|| self.mismatch(name, "a bool"))
    }

    pub fn opt_bool(&self, name: &str) -> PrimResult<Option<bool>> {
        match self.lookup(name)? {
            Arg::Bool(value) => Ok(Some(*value)),
            Arg::None => Ok(None),
            _ => Err(self.mismatch(name, "a bool")),
        }
    }

    pub fn int_list(&self, name: &str) -> PrimResult<Vec<i64>> {
        self.opt_int_list(name)?
            .ok_or_else(|| self.mismatch(name, "an int list"))
    }

    pub fn opt_int_list(&self, name: &str) -> PrimResult<Option<Vec<i64>>> {
        match self.lookup(name)? {
            Arg::IntList(values) => Ok(Some(values.clone())),
            Arg::None => Ok(None),
            _ => Err(self.mismatch(name, "an int list")),
        }
    }

    /// Reads a shape argument; extents were validated non-negative during binding.
    pub fn shape(&self, name: &str) -> PrimResult<Vec<usize>> {
        Ok(self
            .int_list(name)?
            .into_iter()
            .map(|dim| dim as usize)
            .collect())
    }

    /// Reads an int list holding axis indices, which must be non-negative.
    pub fn axes(&self, name: &str) -> PrimResult<Vec<usize>> {
        self.int_list(name)?
            .into_iter()
            .map(|axis| {
                usize::try_from(axis).map_err(|_| PrimError::Schema {
                    schema: self.schema.clone(),
                    detail: format!("`{name}` must hold non-negative axes, got {axis}"),
                })
            })
            .collect()
    }

    pub fn dtype(&self, name: &str) -> PrimResult<DType> {
        match self.lookup(name)? {
            Arg::DType(dtype) => Ok(*dtype),
            _ => Err(self.mismatch(name, "a dtype")),
        }
    }
}
