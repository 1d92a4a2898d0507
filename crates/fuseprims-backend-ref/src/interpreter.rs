use std::collections::HashMap;

use fuseprims::error::{PrimError, PrimResult};
use fuseprims::fusion::backend::FusionBackend;
use fuseprims::fusion::{operator_names, FusionDefinition, FusionOp, Instruction, ValueId};
use fuseprims::prims::reference;
use fuseprims::tensor::Tensor;
use tracing::trace;

/// Host interpreter for fusion definitions, built on the primitive reference kernels.
///
/// Every instruction result is checked against the metadata recorded for it, so a kernel and a
/// meta function that disagree surface as an execution error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceFusionBackend;

impl ReferenceFusionBackend {
    pub fn new() -> Self {
        Self
    }
}

impl FusionBackend for ReferenceFusionBackend {
    fn backend_name(&self) -> &str {
        crate::BACKEND_NAME
    }

    fn operators(&self) -> Vec<&'static str> {
        operator_names()
    }

    fn execute(&self, definition: &FusionDefinition, inputs: &[Tensor]) -> PrimResult<Vec<Tensor>> {
        if definition.inputs().len() != inputs.len() {
            return Err(PrimError::fusion(format!(
                "fusion expects {} input(s), got {}",
                definition.inputs().len(),
                inputs.len()
            )));
        }

        let mut values: HashMap<ValueId, Tensor> = HashMap::new();
        for (&id, input) in definition.inputs().iter().zip(inputs) {
            expect_meta(definition, id, input)?;
            values.insert(id, input.clone());
        }

        for (index, instruction) in definition.instructions().iter().enumerate() {
            let operands = instruction
                .op
                .operands()
                .into_iter()
                .map(|id| {
                    values.get(&id).ok_or_else(|| {
                        PrimError::fusion(format!("operand {id} is not defined before use"))
                    })
                })
                .collect::<PrimResult<Vec<_>>>()?;
            let results = execute_instruction(instruction, &operands).map_err(|err| {
                augment_error(err, index, instruction)
            })?;
            trace!(
                index,
                operator = instruction.op.operator_name(),
                "executed fusion instruction"
            );
            if results.len() != instruction.results.len() {
                return Err(PrimError::fusion(format!(
                    "instruction {index} produced {} result(s), expected {}",
                    results.len(),
                    instruction.results.len()
                )));
            }
            for (&id, result) in instruction.results.iter().zip(results) {
                expect_meta(definition, id, &result)?;
                values.insert(id, result);
            }
        }

        definition
            .outputs()
            .iter()
            .map(|id| {
                values
                    .get(id)
                    .cloned()
                    .ok_or_else(|| PrimError::fusion(format!("output {id} was never computed")))
            })
            .collect()
    }
}

fn expect_meta(definition: &FusionDefinition, id: ValueId, tensor: &Tensor) -> PrimResult<()> {
    match definition.value_meta(id) {
        Some(meta) if meta == tensor.tensor_meta() => Ok(()),
        Some(meta) => Err(PrimError::fusion(format!(
            "value {id} was recorded as {meta} but holds {}",
            tensor.tensor_meta()
        ))),
        None => Err(PrimError::fusion(format!("value {id} is not declared"))),
    }
}

fn augment_error(err: PrimError, index: usize, instruction: &Instruction) -> PrimError {
    match err {
        PrimError::Fusion(message) => PrimError::fusion(format!(
            "instruction {index} ({}): {message}",
            instruction.op.operator_name()
        )),
        other => other,
    }
}

fn expect_operands<'a, const N: usize>(
    operands: &[&'a Tensor],
    operator: &str,
) -> PrimResult<[&'a Tensor; N]> {
    <[&'a Tensor; N]>::try_from(operands).map_err(|_| {
        PrimError::fusion(format!(
            "{operator} expects {N} operand(s), got {}",
            operands.len()
        ))
    })
}

/// Restores reduced axes as unit axes when an instruction asks to keep them.
fn keep_reduced(result: Tensor, input: &Tensor, dims: &[usize], keep_dims: bool) -> PrimResult<Tensor> {
    if keep_dims {
        result.reshape(input.shape().with_unit_axes(dims))
    } else {
        Ok(result)
    }
}

fn execute_instruction(instruction: &Instruction, operands: &[&Tensor]) -> PrimResult<Vec<Tensor>> {
    let operator = instruction.op.operator_name();
    let result = match &instruction.op {
        FusionOp::Unary { kind, .. } => {
            let [a] = expect_operands(operands, operator)?;
            reference::elementwise_unary(*kind, a)?
        }
        FusionOp::Binary { kind, .. } => {
            let [a, b] = expect_operands(operands, operator)?;
            reference::elementwise_binary(*kind, a, b)?
        }
        FusionOp::Where { .. } => {
            let [pred, a, b] = expect_operands(operands, operator)?;
            reference::where_(pred, a, b)?
        }
        FusionOp::BroadcastInDim {
            shape,
            broadcast_dimensions,
            ..
        } => {
            let [a] = expect_operands(operands, operator)?;
            reference::broadcast_in_dim(a, shape, broadcast_dimensions)?
        }
        FusionOp::Cast { dtype, .. } => {
            let [a] = expect_operands(operands, operator)?;
            let target = dtype
                .to_dtype()
                .ok_or_else(|| PrimError::fusion("cast requires a concrete target dtype"))?;
            reference::convert_element_type(a, target)?
        }
        FusionOp::Sum {
            dims,
            keep_dims,
            output_dtype,
            ..
        } => {
            let [a] = expect_operands(operands, operator)?;
            let mut sum = reference::sum(a, dims)?;
            if let Some(dtype) = output_dtype.to_dtype() {
                sum = reference::convert_element_type(&sum, dtype)?;
            }
            keep_reduced(sum, a, dims, *keep_dims)?
        }
        FusionOp::Var {
            dims,
            correction,
            keep_dims,
            ..
        } => {
            let [a] = expect_operands(operands, operator)?;
            keep_reduced(reference::var(a, dims, *correction)?, a, dims, *keep_dims)?
        }
        FusionOp::VarMean {
            dims,
            correction,
            keep_dims,
            ..
        } => {
            let [a] = expect_operands(operands, operator)?;
            let (var, mean) = reference::var_mean(a, dims, *correction)?;
            return Ok(vec![
                keep_reduced(var, a, dims, *keep_dims)?,
                keep_reduced(mean, a, dims, *keep_dims)?,
            ]);
        }
        FusionOp::Max {
            dims, keep_dims, ..
        } => {
            let [a] = expect_operands(operands, operator)?;
            keep_reduced(reference::amax(a, dims)?, a, dims, *keep_dims)?
        }
        FusionOp::Min {
            dims, keep_dims, ..
        } => {
            let [a] = expect_operands(operands, operator)?;
            keep_reduced(reference::amin(a, dims)?, a, dims, *keep_dims)?
        }
    };
    Ok(vec![result])
}
