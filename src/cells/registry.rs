//! Static registry of configured cells

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An isolated backend able to host one database node per provision call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub guid: String,
    pub uri: String,
    pub availability_zone: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("guid", &self.guid)
            .field("uri", &self.uri)
            .field("availability_zone", &self.availability_zone)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Cells loaded from configuration, in configured order.
#[derive(Debug, Clone, Default)]
pub struct CellRegistry {
    cells: Vec<Cell>,
}

impl CellRegistry {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn all(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, guid: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.guid == guid)
    }

    /// Cells matching `guids`, in configured order. An empty filter selects
    /// every cell.
    pub fn filter_by_guids(&self, guids: &[String]) -> Vec<Cell> {
        if guids.is_empty() {
            return self.cells.clone();
        }
        self.cells
            .iter()
            .filter(|c| guids.iter().any(|g| g == &c.guid))
            .cloned()
            .collect()
    }

    /// Distinct availability zones, sorted
    pub fn availability_zones(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|c| c.availability_zone.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn mock_cell(guid: &str, az: &str) -> Cell {
    Cell {
        guid: guid.to_string(),
        uri: format!("http://{}.cells.local", guid),
        availability_zone: az.to_string(),
        username: "broker".to_string(),
        password: "secret".to_string(),
    }
}
