use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

/// The result type used across the network engine.
pub type Result<T> = std::result::Result<T, NetErr>;

/// The network engine's error type.
#[derive(Debug)]
pub enum NetErr {
    /// A layer was configured with an option it does not recognize.
    UnknownOption {
        layer: &'static str,
        option: String,
    },
    /// A recognized option carried a value the layer cannot use.
    InvalidOption {
        layer: &'static str,
        reason: String,
    },
    /// The layer factory was asked for a kind it does not know.
    UnknownLayerType(String),
    /// A layer cannot reconcile the blobs it was handed.
    Shape {
        layer: &'static str,
        reason: String,
    },
    /// A caller supplied array disagrees with the allocated storage.
    ShapeMismatch {
        what: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// An ndarray reshape failed.
    Reshape(ShapeError),
    UnknownBlob(String),
    UnknownParam(String),
    /// Entries sharing a name hold parameters that cannot be summed.
    AggregationInconsistency {
        layer: String,
        reason: String,
    },
    EmptyHistory,
    NotSetUp,
    AlreadySetUp,
    /// An entry names the same blob more than once.
    DuplicateBlob {
        layer: String,
        blob: String,
    },
    InvalidPlan(String),
}

impl Display for NetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetErr::UnknownOption { layer, option } => {
                write!(f, "attribute '{option}' not found in layer {layer}")
            }
            NetErr::InvalidOption { layer, reason } => {
                write!(f, "invalid configuration for layer {layer}: {reason}")
            }
            NetErr::UnknownLayerType(kind) => write!(f, "unknown layer type '{kind}'"),
            NetErr::Shape { layer, reason } => write!(f, "shape error in layer {layer}: {reason}"),
            NetErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what}: got {got:?}, expected {expected:?}"
            ),
            NetErr::Reshape(e) => write!(f, "reshape failed: {e}"),
            NetErr::UnknownBlob(name) => write!(f, "there is no blob named '{name}'"),
            NetErr::UnknownParam(name) => write!(f, "there is no parameter named '{name}'"),
            NetErr::AggregationInconsistency { layer, reason } => write!(
                f,
                "cannot aggregate the entries named '{layer}': {reason}"
            ),
            NetErr::EmptyHistory => write!(f, "there is no pushed state to pop"),
            NetErr::NotSetUp => write!(f, "the network has not been set up"),
            NetErr::AlreadySetUp => write!(f, "the network has already been set up"),
            NetErr::DuplicateBlob { layer, blob } => {
                write!(f, "layer '{layer}' references blob '{blob}' more than once")
            }
            NetErr::InvalidPlan(reason) => write!(f, "invalid execution plan: {reason}"),
        }
    }
}

impl Error for NetErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetErr::Reshape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for NetErr {
    fn from(value: ShapeError) -> Self {
        Self::Reshape(value)
    }
}
