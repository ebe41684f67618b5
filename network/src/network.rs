use std::collections::BTreeMap;

use log::{debug, info, trace, warn};
use ndarray::{Array1, ArrayD, ArrayView, ArrayViewD, ArrayViewMutD, AsArray, Dimension, IxDyn};
use net_core::{Layer, NetErr, ParamStore, Result};

use crate::{
    BlobNames, ExecutionOrder, LayerEntry, RegistrationOrder,
    aggregate::{Aggregate, aggregate, flatten},
    order::validate_plan,
};

/// Named arrays owned by a network, sorted by name.
pub type BlobMap = BTreeMap<String, ArrayD<f32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unconfigured,
    Ready,
}

/// A graph of layers wired together through named blobs.
///
/// Layers are registered with `add_layer` and the network is then `setup` once, which
/// allocates every blob and diff and lets each layer allocate its parameters. After that,
/// `forward` runs the layers in execution order and `backward` runs them in the exact reverse
/// order, so the registration order must respect the data dependencies between layers.
pub struct Network {
    entries: Vec<LayerEntry>,
    order: Box<dyn ExecutionOrder>,
    plan: Vec<usize>,
    state: State,
    blobs: BlobMap,
    diffs: BlobMap,
    history: Vec<BlobMap>,
}

impl Network {
    /// Creates an empty network running its layers in registration order.
    pub fn new() -> Self {
        Self::with_order(RegistrationOrder)
    }

    /// Creates an empty network whose execution order is decided by `order`.
    pub fn with_order<O: ExecutionOrder + 'static>(order: O) -> Self {
        Self {
            entries: Vec::new(),
            order: Box::new(order),
            plan: Vec::new(),
            state: State::Unconfigured,
            blobs: BlobMap::new(),
            diffs: BlobMap::new(),
            history: Vec::new(),
        }
    }

    /// Registers a layer.
    ///
    /// # Arguments
    /// * `name` - The entry's name. Entries sharing a name have their parameters and gradients
    ///   summed by the aggregated accessors.
    /// * `layer` - The layer instance.
    /// * `inputs` - A single blob name or an ordered sequence of them.
    /// * `outputs` - A single blob name or an ordered sequence of them.
    ///
    /// # Errors
    /// `AlreadySetUp` once the network has been set up, `DuplicateBlob` if a blob name is
    /// repeated across `inputs` and `outputs`.
    pub fn add_layer<L, I, O>(&mut self, name: &str, layer: L, inputs: I, outputs: O) -> Result<()>
    where
        L: Layer + 'static,
        I: Into<BlobNames>,
        O: Into<BlobNames>,
    {
        self.add_boxed_layer(name, Box::new(layer), inputs, outputs)
    }

    /// Registers an already boxed layer, see `add_layer`.
    pub fn add_boxed_layer<I, O>(
        &mut self,
        name: &str,
        layer: Box<dyn Layer>,
        inputs: I,
        outputs: O,
    ) -> Result<()>
    where
        I: Into<BlobNames>,
        O: Into<BlobNames>,
    {
        if self.state == State::Ready {
            return Err(NetErr::AlreadySetUp);
        }

        let entry = LayerEntry::new(name.to_string(), layer, inputs.into(), outputs.into())?;
        debug!(
            "registered layer '{}' ({}): {:?} -> {:?}",
            entry.name(),
            entry.layer().kind(),
            entry.inputs(),
            entry.outputs()
        );
        self.entries.push(entry);

        Ok(())
    }

    /// Allocates every blob and diff and sets up every layer.
    ///
    /// The caller supplied blobs are seeded as zero arrays of the given shapes. Any other blob
    /// referenced by an entry starts as an empty placeholder that the layer producing it
    /// resizes. Layers are set up in execution order so each one sees the shapes produced by
    /// the ones before it. Finally one zero diff is created per blob.
    ///
    /// # Arguments
    /// * `initial` - The externally supplied blobs, as (name, array) pairs.
    ///
    /// # Errors
    /// `AlreadySetUp` if called twice, `InvalidPlan` if the execution order is not a
    /// permutation of the entries, or whatever a layer's setup fails with.
    pub fn setup<'a, I, K, V, D>(&mut self, initial: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsArray<'a, f32, D>,
        D: Dimension + 'a,
    {
        if self.state == State::Ready {
            return Err(NetErr::AlreadySetUp);
        }

        let plan = self.order.plan(&self.entries)?;
        validate_plan(&plan, self.entries.len())?;

        for (name, value) in initial {
            let value: ArrayView<'a, f32, D> = value.into();
            self.blobs
                .insert(name.as_ref().to_string(), ArrayD::zeros(IxDyn(value.shape())));
        }

        for entry in &self.entries {
            for name in entry.blob_names() {
                if !self.blobs.contains_key(name) {
                    self.blobs
                        .insert(name.to_string(), ArrayD::zeros(IxDyn(&[0])));
                }
            }
        }

        for &idx in &plan {
            let entry = &mut self.entries[idx];
            debug!(layer = entry.name(), kind = entry.layer().kind(); "setting up layer");
            setup_entry(entry, &mut self.blobs)
                .inspect_err(|e| warn!("setup of layer '{}' failed: {e}", entry.name()))?;
        }

        self.diffs = self
            .blobs
            .iter()
            .map(|(name, blob)| (name.clone(), ArrayD::zeros(blob.raw_dim())))
            .collect();
        self.plan = plan;
        self.state = State::Ready;

        info!(
            "network set up with {} layer(s) and {} blob(s)",
            self.entries.len(),
            self.blobs.len()
        );

        Ok(())
    }

    /// Runs a single forward pass.
    ///
    /// # Arguments
    /// * `initial` - Values overwriting the named blobs before the pass.
    ///
    /// # Errors
    /// `NotSetUp` before `setup`, `UnknownBlob` or `ShapeMismatch` for a bad initial value, or
    /// whatever a layer's forward fails with.
    pub fn forward<'a, I, K, V, D>(&mut self, initial: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsArray<'a, f32, D>,
        D: Dimension + 'a,
    {
        self.ensure_ready()?;
        overwrite(&mut self.blobs, initial)?;
        self.forward_pass()
    }

    /// Runs a forward pass over the blobs as they currently are.
    ///
    /// # Errors
    /// `NotSetUp` before `setup`, or whatever a layer's forward fails with.
    pub fn forward_pass(&mut self) -> Result<()> {
        self.ensure_ready()?;

        for &idx in &self.plan {
            let entry = &mut self.entries[idx];
            trace!(layer = entry.name(); "forward");
            forward_entry(entry, &mut self.blobs)
                .inspect_err(|e| warn!("forward of layer '{}' failed: {e}", entry.name()))?;
        }

        Ok(())
    }

    /// Runs a single backward pass, visiting the layers in reverse execution order.
    ///
    /// # Arguments
    /// * `initial` - Values overwriting the named diffs before the pass.
    ///
    /// # Errors
    /// `NotSetUp` before `setup`, `UnknownBlob` or `ShapeMismatch` for a bad initial value, or
    /// whatever a layer's backward fails with.
    pub fn backward<'a, I, K, V, D>(&mut self, initial: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsArray<'a, f32, D>,
        D: Dimension + 'a,
    {
        self.ensure_ready()?;
        overwrite(&mut self.diffs, initial)?;
        self.backward_pass()
    }

    /// Runs a backward pass over the diffs as they currently are.
    ///
    /// # Errors
    /// `NotSetUp` before `setup`, or whatever a layer's backward fails with.
    pub fn backward_pass(&mut self) -> Result<()> {
        self.ensure_ready()?;

        for &idx in self.plan.iter().rev() {
            let entry = &mut self.entries[idx];
            trace!(layer = entry.name(); "backward");
            backward_entry(entry, &self.blobs, &mut self.diffs)
                .inspect_err(|e| warn!("backward of layer '{}' failed: {e}", entry.name()))?;
        }

        Ok(())
    }

    pub fn blobs(&self) -> &BlobMap {
        &self.blobs
    }

    pub fn diffs(&self) -> &BlobMap {
        &self.diffs
    }

    pub fn blob(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.blobs
            .get(name)
            .ok_or_else(|| NetErr::UnknownBlob(name.to_string()))
    }

    pub fn diff(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.diffs
            .get(name)
            .ok_or_else(|| NetErr::UnknownBlob(name.to_string()))
    }

    /// The registered entries, in registration order.
    pub fn entries(&self) -> &[LayerEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> Option<&LayerEntry> {
        self.entries.get(idx)
    }

    pub fn entry_mut(&mut self, idx: usize) -> Option<&mut LayerEntry> {
        self.entries.get_mut(idx)
    }

    /// The entries registered under `name`, in registration order.
    pub fn entries_named(&self, name: &str) -> impl Iterator<Item = &LayerEntry> {
        self.entries.iter().filter(move |entry| entry.name() == name)
    }

    /// The parameters of every entry, summed across entries sharing a name.
    ///
    /// # Errors
    /// `AggregationInconsistency` if entries sharing a name hold different parameter names or
    /// shapes.
    pub fn parameters(&self) -> Result<Aggregate> {
        aggregate(&self.entries, ParamStore::values)
    }

    /// The parameter gradients of every entry, summed across entries sharing a name.
    pub fn gradient(&self) -> Result<Aggregate> {
        aggregate(&self.entries, ParamStore::grads)
    }

    /// The aggregated parameters flattened in sorted entry name, then parameter name order.
    pub fn flat_parameters(&self) -> Result<Array1<f32>> {
        self.parameters().map(|agg| flatten(&agg))
    }

    /// The aggregated gradients flattened in the same order as `flat_parameters`.
    pub fn flat_gradient(&self) -> Result<Array1<f32>> {
        self.gradient().map(|agg| flatten(&agg))
    }

    /// Distributes a flat vector, laid out like `flat_parameters`, back into the layers.
    ///
    /// When `k` entries share a name, the first `k - 1` of them in registration order receive
    /// `1/k` of that name's slice and the last one receives what is left, so reading
    /// `flat_parameters` back yields exactly `flat`.
    ///
    /// # Errors
    /// `AggregationInconsistency` as in `parameters`, `ShapeMismatch` if `flat` does not have
    /// the length of `flat_parameters`. Nothing is written on error.
    pub fn set_flat_parameters(&mut self, flat: &[f32]) -> Result<()> {
        let sizes: BTreeMap<String, usize> = self
            .parameters()?
            .into_iter()
            .map(|(name, arrays)| (name, arrays.values().map(|array| array.len()).sum()))
            .collect();

        let expected: usize = sizes.values().sum();
        if flat.len() != expected {
            return Err(NetErr::ShapeMismatch {
                what: "flat parameters".into(),
                got: vec![flat.len()],
                expected: vec![expected],
            });
        }

        let mut rest = flat;
        for (name, size) in &sizes {
            let chunk;
            (chunk, rest) = rest.split_at(*size);

            let shares = split_shares(chunk, self.entries_named(name).count());
            for (entry, share) in self
                .entries
                .iter_mut()
                .filter(|e| e.name() == name)
                .zip(&shares)
            {
                entry.layer_mut().set_flat_parameters(share)?;
            }
        }

        Ok(())
    }

    /// Pushes a deep copy of every blob onto the history stack.
    pub fn push_state(&mut self) {
        self.history.push(self.blobs.clone());
        debug!(depth = self.history.len(); "pushed network state");
    }

    /// Replaces the blobs with the most recently pushed copy.
    ///
    /// # Errors
    /// `EmptyHistory` if nothing was pushed.
    pub fn pop_state(&mut self) -> Result<()> {
        self.blobs = self.history.pop().ok_or(NetErr::EmptyHistory)?;
        debug!(depth = self.history.len(); "popped network state");
        Ok(())
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            State::Ready => Ok(()),
            State::Unconfigured => Err(NetErr::NotSetUp),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `chunk` into `k` vectors that sum back to `chunk` in order.
///
/// The first `k - 1` hold `chunk / k`. The last holds `chunk` minus their running sum, which
/// is within a factor of two of `chunk`, so the subtraction and the final sum are exact.
fn split_shares(chunk: &[f32], k: usize) -> Vec<Vec<f32>> {
    let share: Vec<f32> = chunk.iter().map(|v| v / k as f32).collect();
    let mut partial = vec![0.; chunk.len()];
    let mut shares = Vec::with_capacity(k);

    for _ in 1..k {
        partial.iter_mut().zip(&share).for_each(|(p, s)| *p += s);
        shares.push(share.clone());
    }

    shares.push(chunk.iter().zip(&partial).map(|(c, p)| c - p).collect());
    shares
}

/// Overwrites the named arrays of `map` in place.
fn overwrite<'a, I, K, V, D>(map: &mut BlobMap, values: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsArray<'a, f32, D>,
    D: Dimension + 'a,
{
    for (name, value) in values {
        let name = name.as_ref();
        let value: ArrayView<'a, f32, D> = value.into();
        let target = map
            .get_mut(name)
            .ok_or_else(|| NetErr::UnknownBlob(name.to_string()))?;

        if target.shape() != value.shape() {
            return Err(NetErr::ShapeMismatch {
                what: format!("blob '{name}'"),
                got: value.shape().to_vec(),
                expected: target.shape().to_vec(),
            });
        }

        target.assign(&value);
    }

    Ok(())
}

/// Moves the named arrays out of `map` so they can be lent mutably next to the rest of it.
///
/// Every successful `take` must be followed by a `restore` with the same names.
fn take(map: &mut BlobMap, names: &[String]) -> Result<Vec<ArrayD<f32>>> {
    let mut taken = Vec::with_capacity(names.len());
    for name in names {
        match map.remove(name) {
            Some(array) => taken.push(array),
            None => {
                restore(map, names, taken);
                return Err(NetErr::UnknownBlob(name.clone()));
            }
        }
    }

    Ok(taken)
}

fn restore(map: &mut BlobMap, names: &[String], arrays: Vec<ArrayD<f32>>) {
    for (name, array) in names.iter().zip(arrays) {
        map.insert(name.clone(), array);
    }
}

fn views<'m>(map: &'m BlobMap, names: &[String]) -> Result<Vec<ArrayViewD<'m, f32>>> {
    names
        .iter()
        .map(|name| {
            map.get(name)
                .map(|array| array.view())
                .ok_or_else(|| NetErr::UnknownBlob(name.clone()))
        })
        .collect()
}

fn views_mut(arrays: &mut [ArrayD<f32>]) -> Vec<ArrayViewMutD<'_, f32>> {
    arrays.iter_mut().map(|array| array.view_mut()).collect()
}

fn setup_entry(entry: &mut LayerEntry, blobs: &mut BlobMap) -> Result<()> {
    let (layer, inputs, outputs) = entry.split_mut();
    let mut tops = take(blobs, outputs)?;

    let result = views(blobs, inputs).and_then(|bottoms| layer.setup(&bottoms, &mut tops));

    restore(blobs, outputs, tops);
    result
}

fn forward_entry(entry: &mut LayerEntry, blobs: &mut BlobMap) -> Result<()> {
    let (layer, inputs, outputs) = entry.split_mut();
    let mut tops = take(blobs, outputs)?;

    let result = views(blobs, inputs)
        .and_then(|bottoms| layer.forward(&bottoms, &mut views_mut(&mut tops)));

    restore(blobs, outputs, tops);
    result
}

fn backward_entry(entry: &mut LayerEntry, blobs: &BlobMap, diffs: &mut BlobMap) -> Result<()> {
    let (layer, inputs, outputs) = entry.split_mut();
    let mut bottom_diffs = take(diffs, inputs)?;

    let result = run_backward(layer, blobs, diffs, inputs, outputs, &mut bottom_diffs);

    restore(diffs, inputs, bottom_diffs);
    result
}

fn run_backward(
    layer: &mut dyn Layer,
    blobs: &BlobMap,
    diffs: &BlobMap,
    inputs: &[String],
    outputs: &[String],
    bottom_diffs: &mut [ArrayD<f32>],
) -> Result<()> {
    let bottoms = views(blobs, inputs)?;
    let tops = views(blobs, outputs)?;
    let top_diffs = views(diffs, outputs)?;

    layer.backward(&bottoms, &tops, &mut views_mut(bottom_diffs), &top_diffs)
}
