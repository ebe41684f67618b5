use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, ArrayViewMutD};

use crate::{NetErr, Result};

/// A learnable array together with its gradient.
///
/// Both arrays are allocated together and never reshaped afterwards, so they always share the
/// same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    value: ArrayD<f32>,
    grad: ArrayD<f32>,
}

impl Param {
    /// Creates a new `Param` with a zero gradient.
    ///
    /// # Arguments
    /// * `value` - The initial value of the parameter.
    ///
    /// # Returns
    /// A new `Param` instance.
    pub fn new(value: ArrayD<f32>) -> Self {
        let grad = ArrayD::zeros(value.raw_dim());
        Self { value, grad }
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn grad(&self) -> &ArrayD<f32> {
        &self.grad
    }

    /// A writable view over the value. Views cannot be resized.
    pub fn value_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        self.value.view_mut()
    }

    pub fn grad_mut(&mut self) -> ArrayViewMutD<'_, f32> {
        self.grad.view_mut()
    }
}

/// The named parameters owned by a single layer.
///
/// Iteration always follows the lexicographic order of the names, which is the order every
/// flattening operation uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamStore {
    params: BTreeMap<String, Param>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with the given initial value, replacing any previous parameter with
    /// the same name.
    pub fn register(&mut self, name: &str, value: ArrayD<f32>) {
        self.params.insert(name.to_string(), Param::new(value));
    }

    /// Makes sure `name` exists with the given shape.
    ///
    /// Storage that already has the requested shape is kept untouched, otherwise `init` is
    /// called to build a fresh value.
    ///
    /// # Arguments
    /// * `name` - The parameter's name.
    /// * `shape` - The required shape.
    /// * `init` - Builds the initial value for a newly allocated parameter.
    ///
    /// # Returns
    /// Whether a new allocation took place, or the error `init` failed with, in which case the
    /// store is left as it was.
    pub fn ensure<F>(&mut self, name: &str, shape: &[usize], init: F) -> Result<bool>
    where
        F: FnOnce(&[usize]) -> Result<ArrayD<f32>>,
    {
        if let Some(param) = self.params.get(name)
            && param.shape() == shape
        {
            return Ok(false);
        }

        self.register(name, init(shape)?);
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Result<&Param> {
        self.params
            .get(name)
            .ok_or_else(|| NetErr::UnknownParam(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Param> {
        self.params
            .get_mut(name)
            .ok_or_else(|| NetErr::UnknownParam(name.to_string()))
    }

    /// Returns the amount of parameters registered.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the total amount of scalars across every parameter.
    pub fn num_elements(&self) -> usize {
        self.params.values().map(Param::len).sum()
    }

    /// Copies the values into a name to array map.
    pub fn values(&self) -> BTreeMap<String, ArrayD<f32>> {
        self.collect(Param::value)
    }

    /// Copies the gradients into a name to array map.
    pub fn grads(&self) -> BTreeMap<String, ArrayD<f32>> {
        self.collect(Param::grad)
    }

    /// Concatenates every value, in sorted name order, into a single vector.
    pub fn flat_values(&self) -> Array1<f32> {
        self.flatten(Param::value)
    }

    /// Concatenates every gradient, in sorted name order, into a single vector.
    pub fn flat_grads(&self) -> Array1<f32> {
        self.flatten(Param::grad)
    }

    /// Writes `flat` back into the values.
    ///
    /// Each parameter takes the next contiguous slice of `flat` sized to its element count,
    /// in sorted name order.
    ///
    /// # Errors
    /// `ShapeMismatch` if `flat` does not hold exactly `num_elements` scalars, in which case
    /// nothing is written.
    pub fn set_flat_values(&mut self, flat: &[f32]) -> Result<()> {
        let expected = self.num_elements();
        if flat.len() != expected {
            return Err(NetErr::ShapeMismatch {
                what: "flat parameters".into(),
                got: vec![flat.len()],
                expected: vec![expected],
            });
        }

        let mut rest = flat;
        for param in self.params.values_mut() {
            let chunk;
            (chunk, rest) = rest.split_at(param.len());
            param
                .value
                .iter_mut()
                .zip(chunk)
                .for_each(|(v, &x)| *v = x);
        }

        Ok(())
    }

    /// Returns an independent copy of the gradient named `name`.
    pub fn cloned_grad(&self, name: &str) -> Result<ArrayD<f32>> {
        self.get(name).map(|param| param.grad.clone())
    }

    fn collect<F>(&self, pick: F) -> BTreeMap<String, ArrayD<f32>>
    where
        F: Fn(&Param) -> &ArrayD<f32>,
    {
        self.params
            .iter()
            .map(|(name, param)| (name.clone(), pick(param).clone()))
            .collect()
    }

    fn flatten<F>(&self, pick: F) -> Array1<f32>
    where
        F: Fn(&Param) -> &ArrayD<f32>,
    {
        let mut flat = Vec::with_capacity(self.num_elements());
        for param in self.params.values() {
            flat.extend(pick(param).iter().copied());
        }

        Array1::from_vec(flat)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn, array};

    use super::*;

    fn store() -> ParamStore {
        let mut store = ParamStore::new();
        store.register("w", array![[1., 2.], [3., 4.]].into_dyn());
        store.register("b", array![10., 20.].into_dyn());
        store
    }

    #[test]
    fn flattening_follows_sorted_names() {
        let store = store();
        assert_eq!(store.flat_values().to_vec(), vec![10., 20., 1., 2., 3., 4.]);
        assert_eq!(store.flat_grads().to_vec(), vec![0.; 6]);
    }

    #[test]
    fn set_flat_values_round_trip() {
        let mut store = store();
        let v = [6., 5., 4., 3., 2., 1.];

        store.set_flat_values(&v).unwrap();

        assert_eq!(store.flat_values().to_vec(), v.to_vec());
        assert_eq!(
            store.get("w").unwrap().value(),
            &array![[4., 3.], [2., 1.]].into_dyn()
        );
    }

    #[test]
    fn set_flat_values_rejects_wrong_length() {
        let mut store = store();
        let err = store.set_flat_values(&[1., 2.]).unwrap_err();

        assert!(matches!(err, NetErr::ShapeMismatch { .. }));
        assert_eq!(store.flat_values().to_vec(), vec![10., 20., 1., 2., 3., 4.]);
    }

    #[test]
    fn empty_store_flattens_to_empty() {
        let store = ParamStore::new();
        assert_eq!(store.flat_values().len(), 0);
        assert_eq!(store.num_elements(), 0);
    }

    #[test]
    fn cloned_grad_is_independent() {
        let mut store = store();
        let mut copy = store.cloned_grad("b").unwrap();
        copy.fill(7.);

        assert_eq!(store.get("b").unwrap().grad().sum(), 0.);

        store.get_mut("b").unwrap().grad_mut().fill(1.);
        assert_eq!(copy.sum(), 14.);
    }

    #[test]
    fn cloned_grad_of_unknown_name_fails() {
        let err = store().cloned_grad("gamma").unwrap_err();
        assert!(matches!(err, NetErr::UnknownParam(name) if name == "gamma"));
    }

    #[test]
    fn ensure_keeps_matching_storage() {
        let mut store = store();

        let allocated = store.ensure("b", &[2], |shape| Ok(ArrayD::zeros(IxDyn(shape))));
        assert!(!allocated.unwrap());
        assert_eq!(store.get("b").unwrap().value().sum(), 30.);

        let allocated = store.ensure("b", &[3], |shape| Ok(ArrayD::zeros(IxDyn(shape))));
        assert!(allocated.unwrap());
        assert_eq!(store.get("b").unwrap().shape(), &[3]);
        assert_eq!(store.get("b").unwrap().grad().shape(), &[3]);
    }

    #[test]
    fn failed_init_leaves_the_store_untouched() {
        let mut store = store();

        let err = store
            .ensure("w", &[3], |_| Err(NetErr::UnknownParam("w".into())))
            .unwrap_err();

        assert!(matches!(err, NetErr::UnknownParam(_)));
        assert_eq!(store.get("w").unwrap().shape(), &[2, 2]);
        assert!(store.get("v").is_err());
    }
}
