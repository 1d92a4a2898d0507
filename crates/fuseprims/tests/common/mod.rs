#![allow(dead_code)]

use fuseprims::ops::{BinaryOp, UnaryOp};
use fuseprims::prims::schema::{Arg, CallArgs};
use fuseprims::registry::{CatalogOp, ReductionOp, ShapeOp};
use fuseprims::{DType, Tensor};
use rand::rngs::StdRng;
use rand::Rng;

/// Random tensor of `dtype`. Floats land in (0.1, 0.9) so every unary op stays in its domain
/// where it has one; integers in 1..10 so integer division never hits zero.
pub fn random_tensor(rng: &mut StdRng, shape: &[usize], dtype: DType) -> Tensor {
    let numel = shape.iter().product::<usize>();
    let result = if dtype.is_complex() {
        let values = (0..numel)
            .map(|_| (rng.gen_range(0.1..0.9), rng.gen_range(0.1..0.9)))
            .collect();
        Tensor::from_complex(shape, dtype, values)
    } else if dtype.is_bool() {
        let values = (0..numel).map(|_| f64::from(rng.gen_bool(0.5) as u8)).collect();
        Tensor::from_vec(shape, dtype, values)
    } else if dtype.is_integer() {
        let values = (0..numel).map(|_| f64::from(rng.gen_range(1..10i32))).collect();
        Tensor::from_vec(shape, dtype, values)
    } else {
        let values = (0..numel).map(|_| rng.gen_range(0.1..0.9)).collect();
        Tensor::from_vec(shape, dtype, values)
    };
    result.expect("sample shape and data length agree")
}

fn unary_input_dtype(op: UnaryOp) -> DType {
    match op {
        UnaryOp::Imag => DType::C64,
        UnaryOp::BitwiseNot => DType::I32,
        _ => DType::F32,
    }
}

fn binary_input_dtype(op: BinaryOp) -> DType {
    if op.is_bitwise() {
        DType::I32
    } else {
        DType::F32
    }
}

/// Valid tensor inputs for `op`, in schema order.
pub fn sample_inputs(op: CatalogOp, rng: &mut StdRng) -> Vec<Tensor> {
    let shape = [2, 4];
    match op {
        CatalogOp::Unary(op) => vec![random_tensor(rng, &shape, unary_input_dtype(op))],
        CatalogOp::Binary(op) => {
            let dtype = binary_input_dtype(op);
            vec![
                random_tensor(rng, &shape, dtype),
                random_tensor(rng, &shape, dtype),
            ]
        }
        CatalogOp::Ternary(_) => vec![
            random_tensor(rng, &shape, DType::Bool),
            random_tensor(rng, &shape, DType::F32),
            random_tensor(rng, &shape, DType::F32),
        ],
        CatalogOp::Shape(_) | CatalogOp::Reduction(_) => {
            vec![random_tensor(rng, &shape, DType::F32)]
        }
    }
}

/// Call arguments for `op` over `tensors` (host or symbolic), with the non-tensor parameters
/// every test uses: broadcast `[2, 4] -> [2, 3, 4]`, cast to f64, reduce over dim 1.
pub fn call_args<T>(op: CatalogOp, tensors: Vec<T>) -> CallArgs<T> {
    let mut args = CallArgs::new();
    for tensor in tensors {
        args = args.arg(Arg::Tensor(tensor));
    }
    match op {
        CatalogOp::Shape(ShapeOp::BroadcastInDim) => args.arg(vec![2i64, 3, 4]).arg(vec![0i64, 2]),
        CatalogOp::Shape(ShapeOp::ConvertElementType) => args.arg(DType::F64),
        CatalogOp::Reduction(ReductionOp::Var) => {
            args.arg(vec![1i64]).kwarg("correction", 1i64)
        }
        CatalogOp::Reduction(ReductionOp::VarMean) => {
            args.kwarg("dim", vec![1i64]).kwarg("correction", 1i64)
        }
        CatalogOp::Reduction(_) => args.arg(vec![1i64]),
        CatalogOp::Unary(_) | CatalogOp::Binary(_) | CatalogOp::Ternary(_) => args,
    }
}
