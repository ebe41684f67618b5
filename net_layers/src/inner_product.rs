use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, linalg};
use net_core::{
    Layer, LayerConfig, NetErr, ParamStore, Result, expect_counts, expect_shape, parse_options,
    resize_top,
};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Filler;

/// An output shape given either as a single size or as a list of sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ShapeRepr", into = "Vec<usize>")]
pub struct OutputShape(Vec<usize>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ShapeRepr {
    Size(usize),
    Dims(Vec<usize>),
}

impl From<ShapeRepr> for OutputShape {
    fn from(value: ShapeRepr) -> Self {
        match value {
            ShapeRepr::Size(n) => Self(vec![n]),
            ShapeRepr::Dims(dims) => Self(dims),
        }
    }
}

impl From<OutputShape> for Vec<usize> {
    fn from(value: OutputShape) -> Self {
        value.0
    }
}

impl From<usize> for OutputShape {
    fn from(value: usize) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<usize>> for OutputShape {
    fn from(value: Vec<usize>) -> Self {
        Self(value)
    }
}

impl<const N: usize> From<[usize; N]> for OutputShape {
    fn from(value: [usize; N]) -> Self {
        Self(value.to_vec())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InnerProductConfig {
    pub output_shape: OutputShape,
    pub weight_filler: Filler,
    pub bias_filler: Filler,
    /// Seeds the fillers, unseeded layers draw from the OS.
    pub seed: Option<u64>,
}

impl Default for InnerProductConfig {
    fn default() -> Self {
        Self {
            output_shape: OutputShape::from(10),
            weight_filler: Filler::Zeros,
            bias_filler: Filler::Zeros,
            seed: None,
        }
    }
}

impl InnerProductConfig {
    /// A config producing the given output shape with zero-filled parameters.
    pub fn with_output_shape<S: Into<OutputShape>>(output_shape: S) -> Self {
        Self {
            output_shape: output_shape.into(),
            ..Default::default()
        }
    }
}

impl LayerConfig for InnerProductConfig {
    const LAYER: &'static str = "InnerProduct";
    const FIELDS: &'static [&'static str] =
        &["output_shape", "weight_filler", "bias_filler", "seed"];
}

/// An affine map from the whole input to a fixed output shape.
///
/// The weights `w` have shape `input ++ output` and the biases `b` have the output shape, so
/// every input axis is contracted: `y[o] = sum_i x[i] * w[i, o] + b[o]`.
#[derive(Debug)]
pub struct InnerProduct {
    output_shape: Vec<usize>,
    weight_filler: Filler,
    bias_filler: Filler,
    rng: StdRng,
    params: ParamStore,
}

impl InnerProduct {
    /// Creates a new `InnerProduct`.
    ///
    /// # Arguments
    /// * `config` - The layer's configuration.
    ///
    /// # Returns
    /// The new layer, or `InvalidOption` if a filler's distribution is invalid.
    pub fn new(config: InnerProductConfig) -> Result<Self> {
        for filler in [&config.weight_filler, &config.bias_filler] {
            filler.validate().map_err(|reason| NetErr::InvalidOption {
                layer: InnerProductConfig::LAYER,
                reason,
            })?;
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            output_shape: config.output_shape.0,
            weight_filler: config.weight_filler,
            bias_filler: config.bias_filler,
            rng,
            params: ParamStore::new(),
        })
    }

    pub fn from_options(options: Value) -> Result<Self> {
        Self::new(parse_options(options)?)
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn output_size(&self) -> usize {
        self.output_shape.iter().product()
    }

    fn allocate(&mut self, name: &str, shape: &[usize], filler: &Filler) -> Result<()> {
        let rng = &mut self.rng;
        self.params.ensure(name, shape, |shape| {
            filler.fill(shape, rng).map_err(|reason| NetErr::InvalidOption {
                layer: InnerProductConfig::LAYER,
                reason,
            })
        })?;

        Ok(())
    }
}

impl Layer for InnerProduct {
    fn kind(&self) -> &'static str {
        InnerProductConfig::LAYER
    }

    fn setup(&mut self, bottom: &[ArrayViewD<f32>], top: &mut [ArrayD<f32>]) -> Result<()> {
        expect_counts(self.kind(), (bottom.len(), top.len()), (1, 1))?;

        let w_shape: Vec<usize> = bottom[0]
            .shape()
            .iter()
            .chain(&self.output_shape)
            .copied()
            .collect();
        let b_shape = self.output_shape.clone();

        resize_top(&mut top[0], &b_shape);

        let (weight_filler, bias_filler) = (self.weight_filler.clone(), self.bias_filler.clone());
        self.allocate("w", &w_shape, &weight_filler)?;
        self.allocate("b", &b_shape, &bias_filler)?;

        Ok(())
    }

    fn forward(
        &mut self,
        bottom: &[ArrayViewD<f32>],
        top: &mut [ArrayViewMutD<f32>],
    ) -> Result<()> {
        expect_counts(self.kind(), (bottom.len(), top.len()), (1, 1))?;
        expect_shape(self.kind(), top[0].shape(), &self.output_shape)?;

        let (n_in, n_out) = (bottom[0].len(), self.output_size());
        let w = self.params.get("w")?.value();
        let b = self.params.get("b")?.value();
        if w.len() != n_in * n_out {
            return Err(NetErr::Shape {
                layer: self.kind(),
                reason: format!("an input of {n_in} element(s) does not match the weights"),
            });
        }

        let x = bottom[0].to_shape(n_in)?;
        let w = w.to_shape((n_in, n_out))?;
        let b = b.to_shape(n_out)?;

        let y = x.dot(&w) + &b;
        let dim = top[0].raw_dim();
        top[0].assign(&y.into_shape_with_order(dim)?);

        Ok(())
    }

    fn backward(
        &mut self,
        bottom: &[ArrayViewD<f32>],
        _top: &[ArrayViewD<f32>],
        bottom_diff: &mut [ArrayViewMutD<f32>],
        top_diff: &[ArrayViewD<f32>],
    ) -> Result<()> {
        expect_counts(self.kind(), (bottom.len(), top_diff.len()), (1, 1))?;
        expect_counts(self.kind(), (bottom_diff.len(), top_diff.len()), (1, 1))?;
        expect_shape(self.kind(), bottom_diff[0].shape(), bottom[0].shape())?;
        expect_shape(self.kind(), top_diff[0].shape(), &self.output_shape)?;

        let (n_in, n_out) = (bottom[0].len(), self.output_size());
        let x = bottom[0].to_shape((n_in, 1))?;
        let dy = top_diff[0].to_shape((1, n_out))?;

        // every lookup and reshape happens before the first write
        let dx = self
            .params
            .get("w")?
            .value()
            .to_shape((n_in, n_out))?
            .dot(&dy.row(0));
        let dx = dx.into_shape_with_order(bottom_diff[0].raw_dim())?;
        self.params.get("b")?;

        let mut grad_w = self
            .params
            .get_mut("w")?
            .grad_mut()
            .into_shape_with_order((n_in, n_out))?;
        linalg::general_mat_mul(1., &x, &dy, 0., &mut grad_w);

        self.params.get_mut("b")?.grad_mut().assign(&top_diff[0]);
        bottom_diff[0].assign(&dx);

        Ok(())
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }
}
