use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};

use crate::{NetErr, ParamStore, Result};

/// A stateful computation unit of a network.
///
/// Layers never own the blobs they read or write: the network lends them for the duration of
/// a single call. A layer does own its parameters and their gradients, which it allocates in
/// `setup` once the input shapes are known.
pub trait Layer {
    /// Returns the layer's type name.
    fn kind(&self) -> &'static str;

    /// Resizes every top blob to this layer's output shape and allocates the parameters.
    ///
    /// Calling it again with the same input shapes leaves the layer as it was.
    ///
    /// # Arguments
    /// * `bottom` - The input blobs.
    /// * `top` - The output blobs, which may be reallocated.
    ///
    /// # Errors
    /// `NetErr::Shape` if the inputs are incompatible with the layer's configuration.
    fn setup(&mut self, bottom: &[ArrayViewD<f32>], top: &mut [ArrayD<f32>]) -> Result<()>;

    /// Computes the outputs from the inputs and the current parameters.
    ///
    /// # Arguments
    /// * `bottom` - The input blobs.
    /// * `top` - The output blobs, overwritten in place.
    fn forward(&mut self, bottom: &[ArrayViewD<f32>], top: &mut [ArrayViewMutD<f32>])
    -> Result<()>;

    /// Propagates `top_diff` back into `bottom_diff` and overwrites the parameter gradients.
    ///
    /// # Arguments
    /// * `bottom` - The input blobs of the last forward pass.
    /// * `top` - The output blobs of the last forward pass.
    /// * `bottom_diff` - The gradient with respect to the inputs, overwritten in place.
    /// * `top_diff` - The gradient with respect to the outputs.
    fn backward(
        &mut self,
        bottom: &[ArrayViewD<f32>],
        top: &[ArrayViewD<f32>],
        bottom_diff: &mut [ArrayViewMutD<f32>],
        top_diff: &[ArrayViewD<f32>],
    ) -> Result<()>;

    fn params(&self) -> &ParamStore;

    fn params_mut(&mut self) -> &mut ParamStore;

    /// Copies the parameters into a name to array map.
    fn parameters(&self) -> BTreeMap<String, ArrayD<f32>> {
        self.params().values()
    }

    /// Copies the parameter gradients into a name to array map.
    fn gradient(&self) -> BTreeMap<String, ArrayD<f32>> {
        self.params().grads()
    }

    fn flat_parameters(&self) -> Array1<f32> {
        self.params().flat_values()
    }

    fn set_flat_parameters(&mut self, flat: &[f32]) -> Result<()> {
        self.params_mut().set_flat_values(flat)
    }

    fn flat_gradient(&self) -> Array1<f32> {
        self.params().flat_grads()
    }

    /// Returns an independent copy of the gradient named `name`.
    fn mutable_gradient(&self, name: &str) -> Result<ArrayD<f32>> {
        self.params().cloned_grad(name)
    }
}

/// Checks the amount of bottom and top blobs handed to a layer.
///
/// # Arguments
/// * `layer` - The layer's type name, used for the error.
/// * `got` - The amount of (bottom, top) blobs received.
/// * `expected` - The amount of (bottom, top) blobs the layer works with.
pub fn expect_counts(layer: &'static str, got: (usize, usize), expected: (usize, usize)) -> Result<()> {
    if got == expected {
        return Ok(());
    }

    Err(NetErr::Shape {
        layer,
        reason: format!(
            "expected {} bottom and {} top blob(s), got {} and {}",
            expected.0, expected.1, got.0, got.1
        ),
    })
}

/// Checks that an elementwise layer got one top blob per bottom blob.
pub fn expect_pairs(layer: &'static str, bottom: usize, top: usize) -> Result<()> {
    if bottom == top {
        return Ok(());
    }

    Err(NetErr::Shape {
        layer,
        reason: format!("got {bottom} bottom blob(s) but {top} top blob(s)"),
    })
}

/// Checks that a blob handed to a layer has the shape it was set up with.
pub fn expect_shape(layer: &'static str, got: &[usize], expected: &[usize]) -> Result<()> {
    if got == expected {
        return Ok(());
    }

    Err(NetErr::Shape {
        layer,
        reason: format!("got a blob of shape {got:?}, expected {expected:?}"),
    })
}

/// Reallocates `top` as a zero array of the given shape, unless it already has it.
pub fn resize_top(top: &mut ArrayD<f32>, shape: &[usize]) {
    if top.shape() != shape {
        *top = ArrayD::zeros(IxDyn(shape));
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn resize_top_keeps_matching_storage() {
        let mut top = array![1., 2.].into_dyn();

        resize_top(&mut top, &[2]);
        assert_eq!(top, array![1., 2.].into_dyn());

        resize_top(&mut top, &[2, 2]);
        assert_eq!(top, ArrayD::<f32>::zeros(IxDyn(&[2, 2])));
    }

    #[test]
    fn count_checks() {
        assert!(expect_counts("InnerProduct", (1, 1), (1, 1)).is_ok());
        assert!(matches!(
            expect_counts("InnerProduct", (2, 1), (1, 1)),
            Err(NetErr::Shape { layer: "InnerProduct", .. })
        ));
        assert!(expect_pairs("ReLU", 3, 3).is_ok());
        assert!(expect_pairs("ReLU", 3, 2).is_err());
        assert!(expect_shape("ReLU", &[2, 3], &[2, 3]).is_ok());
        assert!(expect_shape("ReLU", &[2, 3], &[3, 2]).is_err());
    }
}
