use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::convex_hull::ConvexHull;
use crate::analysis::hull::EntryId;

/// One row of a stability report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HullSummary {
    pub id: EntryId,
    pub formula: String,
    pub num_atoms: u32,
    pub value: f64,
    pub formation_per_atom: Option<f64>,
    pub distance_to_hull: Option<f64>,
    pub stable: Option<bool>,
}

/// Summarises every entry of `hull`. Hull-dependent columns are `None` while
/// the hull cannot be generated.
pub fn summarise(hull: &ConvexHull) -> Vec<HullSummary> {
    hull.entries()
        .iter()
        .map(|e| HullSummary {
            id: e.id(),
            formula: e.composition().to_string(),
            num_atoms: e.composition().num_atoms(),
            value: e.value(),
            formation_per_atom: hull.hull().and_then(|_| hull.formation_value(e.id())),
            distance_to_hull: hull.distance_to_hull(e.id()),
            stable: hull.is_stable(e.id()),
        })
        .collect()
}

/// Keeps entries that lie on, or within `tolerance` of, the lower hull.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityFilter {
    pub tolerance: f64,
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self { tolerance: 1e-9 }
    }
}

impl StabilityFilter {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn accepts(&self, hull: &ConvexHull, id: EntryId) -> bool {
        hull.distance_to_hull(id)
            .map(|d| d <= self.tolerance)
            .unwrap_or(false)
    }

    /// Ids of the entries passing the filter, in id order. Empty while the hull
    /// cannot be generated.
    pub fn keep(&self, hull: &ConvexHull) -> Vec<EntryId> {
        let kept: Vec<EntryId> = (0..hull.entries().len())
            .filter(|&id| self.accepts(hull, id))
            .collect();
        info!(
            "Stability filter kept {}/{} entries (tolerance {})",
            kept.len(),
            hull.entries().len(),
            self.tolerance
        );
        kept
    }
}
