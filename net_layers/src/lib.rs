mod filler;
mod inner_product;
mod relu;
mod sigmoid;
mod softmax;
mod spec;

pub use filler::Filler;
pub use inner_product::{InnerProduct, InnerProductConfig, OutputShape};
pub use relu::{ReLU, ReluConfig};
pub use sigmoid::{Sigmoid, SigmoidConfig};
pub use softmax::{SoftMax, SoftmaxConfig};
pub use spec::{LAYER_KINDS, LayerSpec, build_layer};
