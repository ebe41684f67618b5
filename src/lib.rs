pub use net_core;
pub use net_layers as layers;
pub use network;

pub use net_core::{Layer, NetErr, Result};
pub use net_layers::{LayerSpec, build_layer};
pub use network::{BlobNames, ExecutionOrder, LayerEntry, Network, RegistrationOrder};

use serde::{Deserialize, Serialize};

/// A serializable description of one registered layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySpec {
    pub name: String,
    #[serde(flatten)]
    pub layer: LayerSpec,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// A serializable description of a whole network, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub entries: Vec<EntrySpec>,
}

impl NetworkSpec {
    /// Builds every layer and registers it on a fresh, not yet set up, network.
    pub fn build(&self) -> Result<Network> {
        let mut net = Network::new();
        for entry in &self.entries {
            net.add_boxed_layer(
                &entry.name,
                entry.layer.build()?,
                entry.inputs.clone(),
                entry.outputs.clone(),
            )?;
        }

        Ok(net)
    }
}
