//! keepdim re-expansion, shared by every realization that offers `keepdim`.
//!
//! Reductions always drop reduced dimensions. Callers asking for `keepdim` get the result
//! re-expanded with `broadcast_in_dim`, reduced axes set to extent 1.

use crate::error::PrimResult;

/// Target shape and broadcast mapping that restore `reduced` axes of `input_dims` as unit axes.
pub fn keepdim_layout(input_dims: &[usize], reduced: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let output_shape = input_dims
        .iter()
        .enumerate()
        .map(|(axis, &dim)| if reduced.contains(&axis) { 1 } else { dim })
        .collect();
    let broadcast_dims = (0..input_dims.len())
        .filter(|axis| !reduced.contains(axis))
        .collect();
    (output_shape, broadcast_dims)
}

/// Re-expands a reduced `value` to the rank of the reduction input.
///
/// `broadcast` receives `(value, output_shape, broadcast_dimensions)`; it is the
/// `broadcast_in_dim` realization matching the tensor kind (meta, eager or symbolic).
pub fn restore_reduced_dims<T, F>(
    value: T,
    input_dims: &[usize],
    reduced: &[usize],
    mut broadcast: F,
) -> PrimResult<T>
where
    F: FnMut(T, &[usize], &[usize]) -> PrimResult<T>,
{
    let (output_shape, broadcast_dims) = keepdim_layout(input_dims, reduced);
    broadcast(value, &output_shape, &broadcast_dims)
}
