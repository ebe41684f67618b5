use std::collections::{BTreeMap, btree_map::Entry};

use ndarray::{Array1, ArrayD};
use net_core::{NetErr, ParamStore, Result};

use crate::LayerEntry;

/// Per entry name, the name to array map of its parameters (or gradients).
pub type Aggregate = BTreeMap<String, BTreeMap<String, ArrayD<f32>>>;

/// Collects one array map per entry name.
///
/// The first entry seen with a name contributes its arrays as they are. Every later entry with
/// the same name must hold exactly the same parameter names and shapes, and its arrays are
/// summed into the first one's.
///
/// # Arguments
/// * `entries` - The entries to aggregate.
/// * `pick` - Extracts the arrays to aggregate from an entry's parameters.
pub(crate) fn aggregate<'a, I, F>(entries: I, pick: F) -> Result<Aggregate>
where
    I: IntoIterator<Item = &'a LayerEntry>,
    F: Fn(&ParamStore) -> BTreeMap<String, ArrayD<f32>>,
{
    let mut acc = Aggregate::new();

    for entry in entries {
        let arrays = pick(entry.layer().params());
        match acc.entry(entry.name().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(arrays);
            }
            Entry::Occupied(mut slot) => merge(entry.name(), slot.get_mut(), arrays)?,
        }
    }

    Ok(acc)
}

fn merge(
    layer: &str,
    acc: &mut BTreeMap<String, ArrayD<f32>>,
    other: BTreeMap<String, ArrayD<f32>>,
) -> Result<()> {
    if !acc.keys().eq(other.keys()) {
        return Err(NetErr::AggregationInconsistency {
            layer: layer.to_string(),
            reason: format!(
                "parameter names {:?} and {:?} differ",
                acc.keys().collect::<Vec<_>>(),
                other.keys().collect::<Vec<_>>()
            ),
        });
    }

    if let Some((name, a, b)) = acc
        .iter()
        .zip(other.values())
        .map(|((name, a), b)| (name, a, b))
        .find(|(_, a, b)| a.shape() != b.shape())
    {
        return Err(NetErr::AggregationInconsistency {
            layer: layer.to_string(),
            reason: format!(
                "parameter '{name}' has shapes {:?} and {:?}",
                a.shape(),
                b.shape()
            ),
        });
    }

    for (sum, array) in acc.values_mut().zip(other.values()) {
        *sum += array;
    }

    Ok(())
}

/// Concatenates every array, sorted by entry name and then by parameter name.
pub(crate) fn flatten(aggregate: &Aggregate) -> Array1<f32> {
    let flat = aggregate
        .values()
        .flat_map(|arrays| arrays.values())
        .flat_map(|array| array.iter().copied())
        .collect();

    Array1::from_vec(flat)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn arrays(pairs: &[(&str, ArrayD<f32>)]) -> BTreeMap<String, ArrayD<f32>> {
        pairs
            .iter()
            .map(|(name, array)| (name.to_string(), array.clone()))
            .collect()
    }

    #[test]
    fn merge_sums_matching_arrays() {
        let mut acc = arrays(&[("b", array![1., 2.].into_dyn()), ("w", array![3.].into_dyn())]);
        let other = arrays(&[("b", array![10., 20.].into_dyn()), ("w", array![30.].into_dyn())]);

        merge("shared", &mut acc, other).unwrap();

        assert_eq!(acc["b"], array![11., 22.].into_dyn());
        assert_eq!(acc["w"], array![33.].into_dyn());
    }

    #[test]
    fn merge_rejects_different_names() {
        let mut acc = arrays(&[("w", array![1.].into_dyn())]);
        let other = arrays(&[("v", array![1.].into_dyn())]);

        let err = merge("shared", &mut acc, other).unwrap_err();
        assert!(matches!(err, NetErr::AggregationInconsistency { layer, .. } if layer == "shared"));
    }

    #[test]
    fn merge_rejects_different_shapes() {
        let mut acc = arrays(&[("w", array![1.].into_dyn())]);
        let other = arrays(&[("w", array![1., 2.].into_dyn())]);

        let err = merge("shared", &mut acc, other).unwrap_err();
        assert!(matches!(err, NetErr::AggregationInconsistency { .. }));
    }

    #[test]
    fn flatten_orders_by_entry_then_parameter() {
        let mut agg = Aggregate::new();
        agg.insert(
            "second".into(),
            arrays(&[("w", array![5.].into_dyn()), ("b", array![4.].into_dyn())]),
        );
        agg.insert("first".into(), arrays(&[("w", array![[1., 2.], [3., 0.]].into_dyn())]));

        assert_eq!(flatten(&agg).to_vec(), vec![1., 2., 3., 0., 4., 5.]);
    }
}
