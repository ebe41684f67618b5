mod config;
mod error;
mod layer;
mod params;

pub use config::{LayerConfig, parse_options};
pub use error::{NetErr, Result};
pub use layer::{Layer, expect_counts, expect_pairs, expect_shape, resize_top};
pub use params::{Param, ParamStore};
