use std::fmt;

use serde::{Deserialize, Serialize};

use super::{BinaryOp, FusionBuilder, FusionDType, FusionTensor, UnaryOp, ValueId};
use crate::error::{PrimError, PrimResult};
use crate::ops::TernaryOp;
use crate::prims::meta;
use crate::tensor::TensorMeta;

/// One recorded backend operator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FusionOp {
    Unary {
        kind: UnaryOp,
        a: ValueId,
    },
    Binary {
        kind: BinaryOp,
        a: ValueId,
        b: ValueId,
    },
    Where {
        pred: ValueId,
        a: ValueId,
        b: ValueId,
    },
    BroadcastInDim {
        a: ValueId,
        shape: Vec<usize>,
        broadcast_dimensions: Vec<usize>,
    },
    Cast {
        a: ValueId,
        dtype: FusionDType,
    },
    Sum {
        a: ValueId,
        dims: Vec<usize>,
        keep_dims: bool,
        output_dtype: FusionDType,
    },
    Var {
        a: ValueId,
        dims: Vec<usize>,
        correction: i64,
        keep_dims: bool,
    },
    VarMean {
        a: ValueId,
        dims: Vec<usize>,
        correction: i64,
        keep_dims: bool,
    },
    Max {
        a: ValueId,
        dims: Vec<usize>,
        keep_dims: bool,
    },
    Min {
        a: ValueId,
        dims: Vec<usize>,
        keep_dims: bool,
    },
}

impl FusionOp {
    /// Backend operator name this instruction invokes.
    pub fn operator_name(&self) -> &'static str {
        match self {
            FusionOp::Unary { kind, .. } => kind.name(),
            FusionOp::Binary { kind, .. } => kind.name(),
            FusionOp::Where { .. } => TernaryOp::Where.name(),
            FusionOp::BroadcastInDim { .. } => super::BROADCAST_IN_DIM_OPERATOR,
            FusionOp::Cast { .. } => super::CAST_OPERATOR,
            FusionOp::Sum { .. } => super::SUM_OPERATOR,
            FusionOp::Var { .. } => super::VAR_OPERATOR,
            FusionOp::VarMean { .. } => super::VAR_MEAN_OPERATOR,
            FusionOp::Max { .. } => super::MAX_OPERATOR,
            FusionOp::Min { .. } => super::MIN_OPERATOR,
        }
    }

    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            FusionOp::Binary { a, b, .. } => vec![*a, *b],
            FusionOp::Where { pred, a, b } => vec![*pred, *a, *b],
            FusionOp::Unary { a, .. }
            | FusionOp::BroadcastInDim { a, .. }
            | FusionOp::Cast { a, .. }
            | FusionOp::Sum { a, .. }
            | FusionOp::Var { a, .. }
            | FusionOp::VarMean { a, .. }
            | FusionOp::Max { a, .. }
            | FusionOp::Min { a, .. } => vec![*a],
        }
    }

    fn fmt_attributes(&self) -> String {
        match self {
            FusionOp::BroadcastInDim {
                shape,
                broadcast_dimensions,
                ..
            } => format!(", shape={shape:?}, broadcast_dimensions={broadcast_dimensions:?}"),
            FusionOp::Cast { dtype, .. } => format!(", dtype={dtype}"),
            FusionOp::Sum {
                dims,
                keep_dims,
                output_dtype,
                ..
            } => format!(", dims={dims:?}, keep_dims={keep_dims}, dtype={output_dtype}"),
            FusionOp::Var {
                dims,
                correction,
                keep_dims,
                ..
            }
            | FusionOp::VarMean {
                dims,
                correction,
                keep_dims,
                ..
            } => format!(", dims={dims:?}, correction={correction}, keep_dims={keep_dims}"),
            FusionOp::Max {
                dims, keep_dims, ..
            }
            | FusionOp::Min {
                dims, keep_dims, ..
            } => format!(", dims={dims:?}, keep_dims={keep_dims}"),
            FusionOp::Unary { .. } | FusionOp::Binary { .. } | FusionOp::Where { .. } => {
                String::new()
            }
        }
    }
}

/// Recorded instruction with the values it defines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub results: Vec<ValueId>,
    pub op: FusionOp,
}

/// Recording [`FusionBuilder`]: an SSA program of backend operator calls.
///
/// Every value's metadata is inferred at record time through the primitive meta functions, so an
/// ill-typed lowering fails while the graph is built rather than when it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionDefinition {
    values: Vec<TensorMeta>,
    inputs: Vec<ValueId>,
    instructions: Vec<Instruction>,
    outputs: Vec<ValueId>,
}

impl FusionDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn value_meta(&self, id: ValueId) -> Option<&TensorMeta> {
        self.values.get(id.0 as usize)
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Marks a value as a program output.
    pub fn add_output(&mut self, tensor: &FusionTensor) -> PrimResult<()> {
        self.check(tensor)?;
        self.outputs.push(tensor.id);
        Ok(())
    }

    /// Distinct backend operators the program invokes, in first-use order.
    pub fn operators_used(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for instruction in &self.instructions {
            let name = instruction.op.operator_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    fn check(&self, tensor: &FusionTensor) -> PrimResult<()> {
        match self.value_meta(tensor.id) {
            Some(meta) if *meta == tensor.meta => Ok(()),
            _ => Err(PrimError::fusion(format!(
                "value {} ({}) does not belong to this fusion definition",
                tensor.id, tensor.meta
            ))),
        }
    }

    fn push_value(&mut self, meta: TensorMeta) -> FusionTensor {
        let id = ValueId(self.values.len() as u32);
        self.values.push(meta.clone());
        FusionTensor { id, meta }
    }

    fn record(&mut self, op: FusionOp, meta: TensorMeta) -> FusionTensor {
        let result = self.push_value(meta);
        self.instructions.push(Instruction {
            results: vec![result.id],
            op,
        });
        result
    }
}

fn keep_reduced(
    meta: TensorMeta,
    input: &TensorMeta,
    dims: &[usize],
    keep_dims: bool,
) -> TensorMeta {
    if keep_dims {
        TensorMeta::new(meta.dtype, input.shape.with_unit_axes(dims))
    } else {
        meta
    }
}

impl FusionBuilder for FusionDefinition {
    fn define_tensor(&mut self, meta: TensorMeta) -> FusionTensor {
        let tensor = self.push_value(meta);
        self.inputs.push(tensor.id);
        tensor
    }

    fn unary(&mut self, op: UnaryOp, a: &FusionTensor) -> PrimResult<FusionTensor> {
        self.check(a)?;
        let meta = meta::elementwise_unary(op, &a.meta)?;
        Ok(self.record(FusionOp::Unary { kind: op, a: a.id }, meta))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        a: &FusionTensor,
        b: &FusionTensor,
    ) -> PrimResult<FusionTensor> {
        self.check(a)?;
        self.check(b)?;
        let meta = meta::elementwise_binary(op, &a.meta, &b.meta)?;
        Ok(self.record(
            FusionOp::Binary {
                kind: op,
                a: a.id,
                b: b.id,
            },
            meta,
        ))
    }

    fn where_(
        &mut self,
        pred: &FusionTensor,
        a: &FusionTensor,
        b: &FusionTensor,
    ) -> PrimResult<FusionTensor> {
        self.check(pred)?;
        self.check(a)?;
        self.check(b)?;
        let meta = meta::where_(&pred.meta, &a.meta, &b.meta)?;
        Ok(self.record(
            FusionOp::Where {
                pred: pred.id,
                a: a.id,
                b: b.id,
            },
            meta,
        ))
    }

    fn broadcast_in_dim(
        &mut self,
        a: &FusionTensor,
        shape: &[usize],
        broadcast_dimensions: &[usize],
    ) -> PrimResult<FusionTensor> {
        self.check(a)?;
        let meta = meta::broadcast_in_dim(&a.meta, shape, broadcast_dimensions)?;
        Ok(self.record(
            FusionOp::BroadcastInDim {
                a: a.id,
                shape: shape.to_vec(),
                broadcast_dimensions: broadcast_dimensions.to_vec(),
            },
            meta,
        ))
    }

    fn cast(&mut self, a: &FusionTensor, dtype: FusionDType) -> PrimResult<FusionTensor> {
        self.check(a)?;
        let target = dtype
            .to_dtype()
            .ok_or_else(|| PrimError::fusion("cast requires a concrete target dtype"))?;
        let meta = meta::convert_element_type(&a.meta, target);
        Ok(self.record(FusionOp::Cast { a: a.id, dtype }, meta))
    }

    fn sum(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        keep_dims: bool,
        output_dtype: FusionDType,
    ) -> PrimResult<FusionTensor> {
        self.check(a)?;
        let mut meta = meta::sum(&a.meta, dims)?;
        if let Some(dtype) = output_dtype.to_dtype() {
            meta.dtype = dtype;
        }
        let meta = keep_reduced(meta, &a.meta, dims, keep_dims);
        Ok(self.record(
            FusionOp::Sum {
                a: a.id,
                dims: dims.to_vec(),
                keep_dims,
                output_dtype,
            },
            meta,
        ))
    }

    fn var(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        correction: i64,
        keep_dims: bool,
    ) -> PrimResult<FusionTensor> {
        self.check(a)?;
        let var = meta::var(&a.meta, dims, correction)?;
        let meta = keep_reduced(var, &a.meta, dims, keep_dims);
        Ok(self.record(
            FusionOp::Var {
                a: a.id,
                dims: dims.to_vec(),
                correction,
                keep_dims,
            },
            meta,
        ))
    }

    fn var_mean(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        correction: i64,
        keep_dims: bool,
    ) -> PrimResult<(FusionTensor, FusionTensor)> {
        self.check(a)?;
        let (var, mean) = meta::var_mean(&a.meta, dims, correction)?;
        let var = self.push_value(keep_reduced(var, &a.meta, dims, keep_dims));
        let mean = self.push_value(keep_reduced(mean, &a.meta, dims, keep_dims));
        self.instructions.push(Instruction {
            results: vec![var.id, mean.id],
            op: FusionOp::VarMean {
                a: a.id,
                dims: dims.to_vec(),
                correction,
                keep_dims,
            },
        });
        Ok((var, mean))
    }

    fn max(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        keep_dims: bool,
    ) -> PrimResult<FusionTensor> {
        self.check(a)?;
        let meta = keep_reduced(meta::amax(&a.meta, dims)?, &a.meta, dims, keep_dims);
        Ok(self.record(
            FusionOp::Max {
                a: a.id,
                dims: dims.to_vec(),
                keep_dims,
            },
            meta,
        ))
    }

    fn min(
        &mut self,
        a: &FusionTensor,
        dims: &[usize],
        keep_dims: bool,
    ) -> PrimResult<FusionTensor> {
        self.check(a)?;
        let meta = keep_reduced(meta::amin(&a.meta, dims)?, &a.meta, dims, keep_dims);
        Ok(self.record(
            FusionOp::Min {
                a: a.id,
                dims: dims.to_vec(),
                keep_dims,
            },
            meta,
        ))
    }
}

fn fmt_values(ids: &[ValueId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_meta(meta: Option<&TensorMeta>) -> String {
    match meta {
        Some(meta) => meta.to_string(),
        None => "<undefined>".to_string(),
    }
}

impl fmt::Display for FusionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .inputs
            .iter()
            .map(|id| format!("{id}: {}", fmt_meta(self.value_meta(*id))))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "fusion({params}) {{")?;
        for instruction in &self.instructions {
            let types = instruction
                .results
                .iter()
                .map(|id| fmt_meta(self.value_meta(*id)))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                f,
                "  {} = {}({}{}) : {}",
                fmt_values(&instruction.results),
                instruction.op.operator_name(),
                fmt_values(&instruction.op.operands()),
                instruction.op.fmt_attributes(),
                types
            )?;
        }
        writeln!(f, "  return {}", fmt_values(&self.outputs))?;
        write!(f, "}}")
    }
}
