use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

/// How a freshly allocated parameter is filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filler {
    #[default]
    Zeros,
    Constant {
        value: f32,
    },
    /// Samples from `[low, high)`.
    Uniform {
        low: f32,
        high: f32,
    },
    Normal {
        mean: f32,
        std_dev: f32,
    },
}

impl Filler {
    /// Checks that the distribution behind this filler can be built.
    ///
    /// # Returns
    /// The reason it cannot, if any.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Filler::Zeros | Filler::Constant { .. } => Ok(()),
            Filler::Uniform { low, high } => Uniform::new(low, high)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Filler::Normal { mean, std_dev } => Normal::new(mean, std_dev)
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }

    /// Builds an array of the given shape filled according to this filler.
    ///
    /// # Arguments
    /// * `shape` - The shape of the array.
    /// * `rng` - The random number generator sampled by the random fillers.
    ///
    /// # Returns
    /// The filled array, or the reason the distribution could not be built.
    pub fn fill<R: Rng>(&self, shape: &[usize], rng: &mut R) -> Result<ArrayD<f32>, String> {
        let dim = IxDyn(shape);
        let filled = match *self {
            Filler::Zeros => ArrayD::zeros(dim),
            Filler::Constant { value } => ArrayD::from_elem(dim, value),
            Filler::Uniform { low, high } => {
                let distribution = Uniform::new(low, high).map_err(|e| e.to_string())?;
                ArrayD::from_shape_simple_fn(dim, || distribution.sample(&mut *rng))
            }
            Filler::Normal { mean, std_dev } => {
                let distribution = Normal::new(mean, std_dev).map_err(|e| e.to_string())?;
                ArrayD::from_shape_simple_fn(dim, || distribution.sample(&mut *rng))
            }
        };

        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn zeros_and_constant() {
        let mut rng = StdRng::seed_from_u64(42);

        let zeros = Filler::Zeros.fill(&[2, 3], &mut rng).unwrap();
        assert_eq!(zeros.shape(), &[2, 3]);
        assert!(zeros.iter().all(|&x| x == 0.));

        let sevens = Filler::Constant { value: 7. }.fill(&[4], &mut rng).unwrap();
        assert!(sevens.iter().all(|&x| x == 7.));
    }

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let filler = Filler::Uniform { low: -0.5, high: 0.5 };

        let sample = filler.fill(&[100], &mut rng).unwrap();
        assert!(sample.iter().all(|&x| (-0.5..0.5).contains(&x)));
    }

    #[test]
    fn same_seed_same_sample() {
        let filler = Filler::Normal {
            mean: 0.,
            std_dev: 1.,
        };

        let a = filler.fill(&[10], &mut StdRng::seed_from_u64(7)).unwrap();
        let b = filler.fill(&[10], &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_ranges_are_reported() {
        assert!(Filler::Uniform { low: 1., high: 0. }.validate().is_err());
        assert!(
            Filler::Normal {
                mean: 0.,
                std_dev: f32::NAN
            }
            .validate()
            .is_err()
        );
        assert!(Filler::Zeros.validate().is_ok());
    }
}
