mod aggregate;
mod entry;
mod network;
mod order;

pub use aggregate::Aggregate;
pub use entry::{BlobNames, LayerEntry};
pub use network::{BlobMap, Network};
pub use order::{ExecutionOrder, RegistrationOrder};
