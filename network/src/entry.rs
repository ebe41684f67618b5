use std::collections::HashSet;

use net_core::{Layer, NetErr, Result};

/// An ordered list of blob names.
///
/// Built from a single name or from any ordered sequence of names, so `add_layer` accepts
/// either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobNames(Vec<String>);

impl BlobNames {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for BlobNames {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for BlobNames {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<&[&str]> for BlobNames {
    fn from(value: &[&str]) -> Self {
        Self(value.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for BlobNames {
    fn from(value: [&str; N]) -> Self {
        Self(value.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<&str>> for BlobNames {
    fn from(value: Vec<&str>) -> Self {
        Self(value.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for BlobNames {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

/// A registered layer together with the blobs it reads and writes.
pub struct LayerEntry {
    name: String,
    layer: Box<dyn Layer>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl LayerEntry {
    /// Creates a new `LayerEntry`.
    ///
    /// # Arguments
    /// * `name` - The entry's name, shared by entries whose parameters are aggregated together.
    /// * `layer` - The layer instance.
    /// * `inputs` - The names of the bottom blobs.
    /// * `outputs` - The names of the top blobs.
    ///
    /// # Returns
    /// The new entry, or `DuplicateBlob` if a blob name appears more than once across the
    /// inputs and outputs.
    pub fn new(
        name: String,
        layer: Box<dyn Layer>,
        inputs: BlobNames,
        outputs: BlobNames,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(blob) = inputs.iter().chain(outputs.iter()).find(|b| !seen.insert(*b)) {
            return Err(NetErr::DuplicateBlob {
                layer: name,
                blob: blob.to_string(),
            });
        }

        Ok(Self {
            name,
            layer,
            inputs: inputs.0,
            outputs: outputs.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> &dyn Layer {
        self.layer.as_ref()
    }

    pub fn layer_mut(&mut self) -> &mut dyn Layer {
        self.layer.as_mut()
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Borrows the layer mutably alongside the input and output names.
    pub(crate) fn split_mut(&mut self) -> (&mut dyn Layer, &[String], &[String]) {
        (self.layer.as_mut(), &self.inputs, &self.outputs)
    }

    /// Every blob name this entry touches, inputs first.
    pub fn blob_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().chain(&self.outputs).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use net_layers::ReLU;

    use super::*;

    #[test]
    fn single_names_become_one_element_lists() {
        assert_eq!(BlobNames::from("x").as_slice(), &["x".to_string()]);
        assert_eq!(BlobNames::from(String::from("x")).len(), 1);
        assert_eq!(
            BlobNames::from(["a", "b"]).iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(BlobNames::from(vec!["a", "b", "c"]).len(), 3);
    }

    #[test]
    fn repeated_blob_is_rejected() {
        let err = LayerEntry::new(
            "relu".into(),
            Box::new(ReLU::default()),
            "x".into(),
            "x".into(),
        )
        .err()
        .unwrap();

        assert!(matches!(err, NetErr::DuplicateBlob { blob, .. } if blob == "x"));
    }

    #[test]
    fn blob_names_lists_inputs_then_outputs() {
        let entry = LayerEntry::new(
            "relu".into(),
            Box::new(ReLU::default()),
            ["a", "b"].into(),
            ["c", "d"].into(),
        )
        .unwrap();

        assert_eq!(entry.blob_names().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
        assert_eq!(entry.layer().kind(), "ReLU");
    }
}
