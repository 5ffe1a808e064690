//! Desired vs. current topology diff
//!
//! The kind of change is picked from a decision table keyed by the direction
//! of the node count change and whether the node size changes; each
//! [`Transition`] then expands into a fixed step sequence.

use crate::cells::{Cell, CellRegistry};
use crate::cluster::{ClusterFeatures, ClusterState, Node};
use crate::common::{Error, Result};
use crate::scheduler::steps::{AddNode, RemoveNode, ReplaceMaster, ReplaceReplica, Step};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeChange {
    Unchanged,
    Changed,
}

/// Node sizes before and after a vertical resize
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeTarget {
    pub old_size: u64,
    pub new_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Desired node count is zero
    Teardown,
    ScaleOut { add: usize },
    ScaleIn { remove: usize },
    Resize,
    ResizeScaleOut { add: usize },
    ResizeScaleIn { remove: usize },
    NoChange,
}

impl Transition {
    pub fn classify(current: usize, desired: usize, size: SizeChange) -> Self {
        if desired == 0 {
            return Transition::Teardown;
        }
        match (desired.cmp(&current), size) {
            (Ordering::Greater, SizeChange::Unchanged) => Transition::ScaleOut {
                add: desired - current,
            },
            (Ordering::Less, SizeChange::Unchanged) => Transition::ScaleIn {
                remove: current - desired,
            },
            (Ordering::Equal, SizeChange::Unchanged) => Transition::NoChange,
            (Ordering::Equal, SizeChange::Changed) => Transition::Resize,
            (Ordering::Greater, SizeChange::Changed) => Transition::ResizeScaleOut {
                add: desired - current,
            },
            (Ordering::Less, SizeChange::Changed) => Transition::ResizeScaleIn {
                remove: current - desired,
            },
        }
    }
}

/// Whether the desired topology changes node size.
///
/// Always `Unchanged`: node sizes are not tracked, so vertical resize is never
/// planned.
pub fn size_change(_current: &ClusterState, _desired: &ClusterFeatures) -> SizeChange {
    SizeChange::Unchanged
}

/// Diff `current` against `desired` into an ordered step list.
///
/// Fails with `NoBackendsAvailable` when no configured cell passes the
/// desired cell filter.
pub fn plan(
    registry: &CellRegistry,
    current: &ClusterState,
    desired: &ClusterFeatures,
) -> Result<Vec<Step>> {
    let candidates = registry.filter_by_guids(&desired.cell_guids_for_new_nodes);
    if candidates.is_empty() {
        return Err(Error::NoBackendsAvailable);
    }

    let transition = Transition::classify(
        current.node_count(),
        desired.node_count,
        size_change(current, desired),
    );
    let steps = expand(transition, &current.nodes, &candidates, SizeTarget::default());

    tracing::info!(
        "Cluster {}: {} -> {} nodes, {:?}, {} steps",
        current.instance_id,
        current.node_count(),
        desired.node_count,
        transition,
        steps.len()
    );
    Ok(steps)
}

/// Expand a transition into steps. Removals take the newest nodes first.
pub fn expand(
    transition: Transition,
    nodes: &[Node],
    candidates: &[Cell],
    size: SizeTarget,
) -> Vec<Step> {
    let add = move |n: usize| {
        (0..n).map(move |_| Step::AddNode(AddNode::new(candidates.to_vec())))
    };
    let remove = move |n: usize| {
        nodes
            .iter()
            .rev()
            .take(n)
            .map(|node| Step::RemoveNode(RemoveNode::new(node.clone())))
    };
    let replace = move |replicas: usize| {
        std::iter::once(Step::ReplaceMaster(ReplaceMaster::new(size.new_size))).chain(
            (0..replicas).map(move |_| {
                Step::ReplaceReplica(ReplaceReplica::new(size.old_size, size.new_size))
            }),
        )
    };
    let current = nodes.len();

    match transition {
        Transition::Teardown => remove(current).collect(),
        Transition::ScaleOut { add: n } => add(n).collect(),
        Transition::ScaleIn { remove: n } => remove(n).collect(),
        Transition::Resize => replace(current.saturating_sub(1)).collect(),
        Transition::ResizeScaleOut { add: n } => replace(current.saturating_sub(1))
            .chain(add(n))
            .collect(),
        Transition::ResizeScaleIn { remove: n } => {
            let target = current.saturating_sub(n);
            replace(target.saturating_sub(1)).chain(remove(n)).collect()
        }
        Transition::NoChange => Vec::new(),
    }
}
