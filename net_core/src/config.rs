use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{NetErr, Result};

/// The typed set of options a layer accepts at construction.
///
/// `FIELDS` is the allow-list of option names. Anything else is rejected before the options
/// are deserialized.
pub trait LayerConfig: DeserializeOwned + Default {
    /// The layer's type name, used in error messages.
    const LAYER: &'static str;

    /// Every option name this layer recognizes.
    const FIELDS: &'static [&'static str];
}

/// Parses a JSON object of options into the layer's config.
///
/// `null` yields the default config.
///
/// # Errors
/// `UnknownOption` for a name outside `C::FIELDS`, `InvalidOption` when the options are not an
/// object or a value has the wrong type.
pub fn parse_options<C: LayerConfig>(options: Value) -> Result<C> {
    let map = match options {
        Value::Null => return Ok(C::default()),
        Value::Object(map) => map,
        other => {
            return Err(NetErr::InvalidOption {
                layer: C::LAYER,
                reason: format!("expected an object of options, got {other}"),
            });
        }
    };

    if let Some(option) = map.keys().find(|key| !C::FIELDS.contains(&key.as_str())) {
        return Err(NetErr::UnknownOption {
            layer: C::LAYER,
            option: option.clone(),
        });
    }

    serde_json::from_value(Value::Object(map)).map_err(|e| NetErr::InvalidOption {
        layer: C::LAYER,
        reason: e.to_string(),
    })
}
