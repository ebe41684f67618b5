use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};
use net_core::{
    Layer, LayerConfig, NetErr, ParamStore, Result, expect_pairs, expect_shape, parse_options,
    resize_top,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidConfig {
    /// The slope applied to the input before squashing it.
    pub sigma: f32,
}

impl Default for SigmoidConfig {
    fn default() -> Self {
        Self { sigma: 1.0 }
    }
}

impl LayerConfig for SigmoidConfig {
    const LAYER: &'static str = "Sigmoid";
    const FIELDS: &'static [&'static str] = &["sigma"];
}

/// `f(x) = 1 / (1 + exp(-sigma * x))` over every (bottom, top) pair.
#[derive(Debug)]
pub struct Sigmoid {
    sigma: f32,
    params: ParamStore,
}

impl Sigmoid {
    pub fn new(config: SigmoidConfig) -> Self {
        Self {
            sigma: config.sigma,
            params: ParamStore::new(),
        }
    }

    /// Builds a `Sigmoid` from a JSON object of options.
    ///
    /// # Errors
    /// `UnknownOption` for anything but `sigma`, `InvalidOption` if `sigma` is not finite.
    pub fn from_options(options: Value) -> Result<Self> {
        let config: SigmoidConfig = parse_options(options)?;
        if !config.sigma.is_finite() {
            return Err(NetErr::InvalidOption {
                layer: SigmoidConfig::LAYER,
                reason: format!("sigma must be finite, got {}", config.sigma),
            });
        }

        Ok(Self::new(config))
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Splits on the sign of the exponent so `exp` never overflows.
    fn squash(&self, x: f32) -> f32 {
        let d = -x * self.sigma;
        let ep = (-d.max(0.)).exp();
        let en = d.min(0.).exp();
        ep / (ep + en)
    }
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self::new(SigmoidConfig::default())
    }
}

impl Layer for Sigmoid {
    fn kind(&self) -> &'static str {
        SigmoidConfig::LAYER
    }

    fn setup(&mut self, bottom: &[ArrayViewD<f32>], top: &mut [ArrayD<f32>]) -> Result<()> {
        expect_pairs(self.kind(), bottom.len(), top.len())?;
        for (b, t) in bottom.iter().zip(top) {
            resize_top(t, b.shape());
        }

        Ok(())
    }

    fn forward(
        &mut self,
        bottom: &[ArrayViewD<f32>],
        top: &mut [ArrayViewMutD<f32>],
    ) -> Result<()> {
        expect_pairs(self.kind(), bottom.len(), top.len())?;
        for (b, t) in bottom.iter().zip(top) {
            expect_shape(self.kind(), t.shape(), b.shape())?;
            Zip::from(t).and(b).for_each(|t, &b| *t = self.squash(b));
        }

        Ok(())
    }

    fn backward(
        &mut self,
        bottom: &[ArrayViewD<f32>],
        top: &[ArrayViewD<f32>],
        bottom_diff: &mut [ArrayViewMutD<f32>],
        top_diff: &[ArrayViewD<f32>],
    ) -> Result<()> {
        expect_pairs(self.kind(), bottom.len(), top.len())?;
        expect_pairs(self.kind(), bottom_diff.len(), top_diff.len())?;
        let sigma = self.sigma;
        for ((t, db), dt) in top.iter().zip(bottom_diff).zip(top_diff) {
            expect_shape(self.kind(), db.shape(), t.shape())?;
            expect_shape(self.kind(), dt.shape(), t.shape())?;
            Zip::from(db)
                .and(t)
                .and(dt)
                .for_each(|db, &t, &dt| *db = dt * t * (1. - t) * sigma);
        }

        Ok(())
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }
}
