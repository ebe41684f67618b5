use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};
use net_core::{
    Layer, LayerConfig, ParamStore, Result, expect_pairs, expect_shape, parse_options, resize_top,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The rectified linear unit takes no options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReluConfig {}

impl LayerConfig for ReluConfig {
    const LAYER: &'static str = "ReLU";
    const FIELDS: &'static [&'static str] = &[];
}

/// Elementwise `max(x, 0)` over every (bottom, top) pair.
#[derive(Debug, Default)]
pub struct ReLU {
    params: ParamStore,
}

impl ReLU {
    pub fn new(_config: ReluConfig) -> Self {
        Self::default()
    }

    pub fn from_options(options: Value) -> Result<Self> {
        parse_options(options).map(Self::new)
    }
}

impl Layer for ReLU {
    fn kind(&self) -> &'static str {
        ReluConfig::LAYER
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
            Zip::from(t).and(b).for_each(|t, &b| *t = b.max(0.));
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
        for ((t, db), dt) in top.iter().zip(bottom_diff).zip(top_diff) {
            expect_shape(self.kind(), db.shape(), t.shape())?;
            expect_shape(self.kind(), dt.shape(), t.shape())?;
            Zip::from(db)
                .and(t)
                .and(dt)
                .for_each(|db, &t, &dt| *db = if t > 0. { dt } else { 0. });
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
