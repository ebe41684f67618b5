use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, Zip};
use net_core::{
    Layer, LayerConfig, NetErr, ParamStore, Result, expect_counts, expect_shape, parse_options,
    resize_top,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The softmax takes no options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoftmaxConfig {}

impl LayerConfig for SoftmaxConfig {
    const LAYER: &'static str = "SoftMax";
    const FIELDS: &'static [&'static str] = &[];
}

/// Normalizes every row (lane along the last axis) into a distribution.
///
/// Each row is shifted by its minimum and negated before exponentiating, so the exponent is
/// never positive: `y = exp(min(x) - x) / sum(exp(min(x) - x))`.
#[derive(Debug, Default)]
pub struct SoftMax {
    params: ParamStore,
}

impl SoftMax {
    pub fn new(_config: SoftmaxConfig) -> Self {
        Self::default()
    }

    pub fn from_options(options: Value) -> Result<Self> {
        parse_options(options).map(Self::new)
    }

    fn row_axis(&self, x: &ArrayViewD<f32>) -> Result<Axis> {
        match x.ndim() {
            0 => Err(NetErr::Shape {
                layer: self.kind(),
                reason: "cannot normalize a zero-dimensional blob".into(),
            }),
            n => Ok(Axis(n - 1)),
        }
    }
}

impl Layer for SoftMax {
    fn kind(&self) -> &'static str {
        SoftmaxConfig::LAYER
    }

    fn setup(&mut self, bottom: &[ArrayViewD<f32>], top: &mut [ArrayD<f32>]) -> Result<()> {
        expect_counts(self.kind(), (bottom.len(), top.len()), (1, 1))?;
        self.row_axis(&bottom[0])?;
        resize_top(&mut top[0], bottom[0].shape());

        Ok(())
    }

    fn forward(
        &mut self,
        bottom: &[ArrayViewD<f32>],
        top: &mut [ArrayViewMutD<f32>],
    ) -> Result<()> {
        expect_counts(self.kind(), (bottom.len(), top.len()), (1, 1))?;
        expect_shape(self.kind(), top[0].shape(), bottom[0].shape())?;
        let axis = self.row_axis(&bottom[0])?;

        Zip::from(top[0].lanes_mut(axis))
            .and(bottom[0].lanes(axis))
            .for_each(|mut y, x| {
                let min = x.fold(f32::INFINITY, |m, &v| m.min(v));
                y.zip_mut_with(&x, |y, &x| *y = (min - x).exp());
                let z = y.sum();
                y.mapv_inplace(|y| y / z);
            });

        Ok(())
    }

    /// With `y = softmax(-x)` the Jacobian is `dy_i/dx_j = -y_i (delta_ij - y_j)`, hence
    /// `dx_j = y_j (sum_i dy_i y_i - dy_j)`.
    fn backward(
        &mut self,
        bottom: &[ArrayViewD<f32>],
        top: &[ArrayViewD<f32>],
        bottom_diff: &mut [ArrayViewMutD<f32>],
        top_diff: &[ArrayViewD<f32>],
    ) -> Result<()> {
        expect_counts(self.kind(), (bottom.len(), top.len()), (1, 1))?;
        expect_counts(self.kind(), (bottom_diff.len(), top_diff.len()), (1, 1))?;
        expect_shape(self.kind(), bottom_diff[0].shape(), top[0].shape())?;
        expect_shape(self.kind(), top_diff[0].shape(), top[0].shape())?;
        let axis = self.row_axis(&top[0])?;

        Zip::from(bottom_diff[0].lanes_mut(axis))
            .and(top[0].lanes(axis))
            .and(top_diff[0].lanes(axis))
            .for_each(|mut dx, y, dy| {
                let dot = y.dot(&dy);
                Zip::from(&mut dx)
                    .and(&y)
                    .and(&dy)
                    .for_each(|dx, &y, &dy| *dx = y * (dot - dy));
            });

        Ok(())
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn, array};
    use serde_json::json;

    use super::*;

    fn forward(layer: &mut SoftMax, x: &ArrayD<f32>) -> ArrayD<f32> {
        let mut top = vec![ArrayD::zeros(IxDyn(&[0]))];
        layer.setup(&[x.view()], &mut top).unwrap();
        layer.forward(&[x.view()], &mut [top[0].view_mut()]).unwrap();
        top.remove(0)
    }

    #[test]
    fn rows_sum_to_one() {
        let mut layer = SoftMax::default();
        let y = forward(&mut layer, &array![[1., 2., 3.], [-5., 0., 1000.]].into_dyn());

        for row in y.lanes(Axis(1)) {
            assert!((row.sum() - 1.).abs() < 1e-6);
            assert!(row.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn smallest_input_gets_largest_weight() {
        let mut layer = SoftMax::default();
        let y = forward(&mut layer, &array![0., 1f32.ln()].into_dyn());
        assert!((y[0] - 0.5).abs() < 1e-6);

        let y = forward(&mut layer, &array![0., 2f32.ln()].into_dyn());
        assert!((y[0] - 2. / 3.).abs() < 1e-6);
        assert!((y[1] - 1. / 3.).abs() < 1e-6);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut layer = SoftMax::default();
        let x = array![[0.3, -1.2, 0.8], [2.0, 0.1, -0.4]].into_dyn();
        let dy = array![[1., -2., 0.5], [0.25, 3., -1.]].into_dyn();
        let y = forward(&mut layer, &x);

        let mut dx = ArrayD::zeros(x.raw_dim());
        layer
            .backward(&[x.view()], &[y.view()], &mut [dx.view_mut()], &[dy.view()])
            .unwrap();

        let objective = |layer: &mut SoftMax, x: &ArrayD<f32>| -> f32 {
            (forward(layer, x) * &dy).sum()
        };
        let eps = 1e-2;
        for (idx, &analytic) in dx.indexed_iter() {
            let (mut plus, mut minus) = (x.clone(), x.clone());
            plus[&idx] += eps;
            minus[&idx] -= eps;
            let numeric = (objective(&mut layer, &plus) - objective(&mut layer, &minus)) / (2. * eps);
            assert!(
                (numeric - analytic).abs() < 1e-2,
                "at {idx:?}: numeric {numeric}, analytic {analytic}"
            );
        }
    }

    #[test]
    fn rejects_scalars_and_options() {
        let mut layer = SoftMax::default();
        let x = ArrayD::from_elem(IxDyn(&[]), 1.);
        let mut top = vec![ArrayD::zeros(IxDyn(&[0]))];
        assert!(matches!(
            layer.setup(&[x.view()], &mut top),
            Err(NetErr::Shape { .. })
        ));

        let err = SoftMax::from_options(json!({ "axis": 0 })).unwrap_err();
        assert!(matches!(err, NetErr::UnknownOption { .. }));
    }
}
