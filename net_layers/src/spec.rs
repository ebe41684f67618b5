use log::debug;
use net_core::{Layer, NetErr, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{InnerProduct, ReLU, Sigmoid, SoftMax};

/// The layer kinds `build_layer` knows how to construct.
pub const LAYER_KINDS: &[&str] = &["relu", "sigmoid", "inner_product", "softmax"];

/// A serializable description of a layer.
///
/// `kind` selects the layer type (see `LAYER_KINDS`) and `options` carries its configuration
/// as a JSON object, so descriptions can be stored next to the rest of a model's settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub kind: String,
    #[serde(default)]
    pub options: Value,
}

impl LayerSpec {
    pub fn new<K: Into<String>>(kind: K, options: Value) -> Self {
        Self {
            kind: kind.into(),
            options,
        }
    }

    pub fn build(&self) -> Result<Box<dyn Layer>> {
        build_layer(&self.kind, self.options.clone())
    }
}

/// Constructs a layer of the given kind from a JSON object of options.
///
/// # Errors
/// `UnknownLayerType` for an unregistered kind, or the layer's own configuration errors.
pub fn build_layer(kind: &str, options: Value) -> Result<Box<dyn Layer>> {
    debug!(kind = kind; "building layer");

    let layer: Box<dyn Layer> = match kind {
        "relu" => Box::new(ReLU::from_options(options)?),
        "sigmoid" => Box::new(Sigmoid::from_options(options)?),
        "inner_product" => Box::new(InnerProduct::from_options(options)?),
        "softmax" => Box::new(SoftMax::from_options(options)?),
        other => return Err(NetErr::UnknownLayerType(other.to_string())),
    };

    Ok(layer)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builds_every_kind() {
        for kind in LAYER_KINDS {
            let layer = build_layer(kind, Value::Null).unwrap();
            assert!(!layer.kind().is_empty());
        }
    }

    #[test]
    fn spec_from_json() {
        let spec: LayerSpec = serde_json::from_value(json!({
            "kind": "sigmoid",
            "options": { "sigma": 0.5 }
        }))
        .unwrap();

        let layer = spec.build().unwrap();
        assert_eq!(layer.kind(), "Sigmoid");

        let spec: LayerSpec = serde_json::from_value(json!({ "kind": "relu" })).unwrap();
        assert_eq!(spec.options, Value::Null);
        assert_eq!(spec.build().unwrap().kind(), "ReLU");
    }

    #[test]
    fn unknown_kind() {
        let err = build_layer("convolution", Value::Null).err().unwrap();
        assert!(matches!(err, NetErr::UnknownLayerType(kind) if kind == "convolution"));
    }

    #[test]
    fn unknown_option_bubbles_up() {
        let err = LayerSpec::new("inner_product", json!({ "bias": true }))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, NetErr::UnknownOption { layer: "InnerProduct", .. }));
    }
}
