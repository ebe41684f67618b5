use net_core::{NetErr, Result};

use crate::LayerEntry;

/// Decides in which order a network runs its entries.
///
/// The forward pass walks the returned plan front to back and the backward pass walks it back
/// to front. A plan must visit every entry exactly once.
pub trait ExecutionOrder {
    /// Computes the execution plan as a list of entry indices.
    fn plan(&self, entries: &[LayerEntry]) -> Result<Vec<usize>>;
}

/// Runs the entries in the order they were registered.
///
/// The caller is trusted to register every entry after the ones producing its inputs, nothing
/// is validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationOrder;

impl ExecutionOrder for RegistrationOrder {
    fn plan(&self, entries: &[LayerEntry]) -> Result<Vec<usize>> {
        Ok((0..entries.len()).collect())
    }
}

/// Checks that `plan` is a permutation of `0..len`.
pub(crate) fn validate_plan(plan: &[usize], len: usize) -> Result<()> {
    if plan.len() != len {
        return Err(NetErr::InvalidPlan(format!(
            "the plan has {} step(s) for {len} entries",
            plan.len()
        )));
    }

    let mut visited = vec![false; len];
    for &idx in plan {
        match visited.get(idx).copied() {
            Some(false) => visited[idx] = true,
            Some(true) => {
                return Err(NetErr::InvalidPlan(format!("entry {idx} is visited twice")));
            }
            None => {
                return Err(NetErr::InvalidPlan(format!("entry {idx} does not exist")));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutations_are_valid() {
        assert!(validate_plan(&[], 0).is_ok());
        assert!(validate_plan(&[2, 0, 1], 3).is_ok());
    }

    #[test]
    fn broken_plans_are_rejected() {
        assert!(matches!(validate_plan(&[0, 1], 3), Err(NetErr::InvalidPlan(_))));
        assert!(matches!(validate_plan(&[0, 0, 1], 3), Err(NetErr::InvalidPlan(_))));
        assert!(matches!(validate_plan(&[0, 1, 3], 3), Err(NetErr::InvalidPlan(_))));
    }
}
