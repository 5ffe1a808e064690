//! Cell placement for new nodes
//!
//! Candidates are ordered so a new node lands, in order of preference:
//! 1. in the availability zone with the fewest cells used by this cluster,
//! 2. on the least loaded cell of that zone (fleet-wide node count),
//! 3. on a cell that does not already host a node of this cluster.
//!
//! Cells already hosting a node of the cluster are kept at the end as a
//! fallback. A cluster with no nodes yet is ordered by load alone.

use crate::cells::{Cell, CellRegistry, CellsHealth};
use crate::cluster::Node;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Orders candidate cells for one new node of a cluster.
pub struct Placement<'a> {
    /// Resolves the AZ of cells hosting existing nodes, including cells
    /// outside the candidate list.
    registry: &'a CellRegistry,
}

impl<'a> Placement<'a> {
    pub fn new(registry: &'a CellRegistry) -> Self {
        Self { registry }
    }

    /// Most preferred cell first. Every candidate appears exactly once.
    pub fn order(&self, candidates: &[Cell], nodes: &[Node], health: &CellsHealth) -> Vec<Cell> {
        let load = |cell: &Cell| health.get(&cell.guid).copied().unwrap_or(0);

        if nodes.is_empty() {
            let mut ordered = candidates.to_vec();
            ordered.sort_by_key(load);
            return ordered;
        }

        let used: HashSet<&str> = nodes.iter().map(|n| n.cell_guid.as_str()).collect();
        let az_rank = self.az_rank(candidates, &used);

        let (mut used_cells, mut unused_cells): (Vec<Cell>, Vec<Cell>) = candidates
            .iter()
            .cloned()
            .partition(|c| used.contains(c.guid.as_str()));

        let sort_key = |c: &Cell| {
            (
                az_rank
                    .get(c.availability_zone.as_str())
                    .copied()
                    .unwrap_or(usize::MAX),
                load(c),
                c.guid.clone(),
            )
        };
        unused_cells.sort_by_key(|c| sort_key(c));
        used_cells.sort_by_key(|c| sort_key(c));

        unused_cells.extend(used_cells);
        unused_cells
    }

    /// Rank of each candidate AZ: fewest used cells first, ties by AZ name.
    /// A cell hosting several nodes of the cluster counts once.
    fn az_rank(&self, candidates: &[Cell], used: &HashSet<&str>) -> HashMap<String, usize> {
        let mut usage: BTreeMap<&str, usize> = candidates
            .iter()
            .map(|c| (c.availability_zone.as_str(), 0))
            .collect();

        for guid in used {
            let az = candidates
                .iter()
                .find(|c| c.guid == *guid)
                .or_else(|| self.registry.get(guid))
                .map(|c| c.availability_zone.as_str());
            match az {
                Some(az) => {
                    if let Some(count) = usage.get_mut(az) {
                        *count += 1;
                    }
                }
                None => tracing::warn!("Cluster node is on unknown cell {}", guid),
            }
        }

        let mut zones: Vec<(&str, usize)> = usage.into_iter().collect();
        zones.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        zones
            .into_iter()
            .enumerate()
            .map(|(rank, (az, _))| (az.to_string(), rank))
            .collect()
    }
}
