use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::build_cell::point_separator::PointSeparator;
use crate::core::chemistry::SpeciesDatabase;
use crate::core::domain::{PropertyKey, Species};

/// An explicit minimum separation for one species pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairDistance {
    pub a: String,
    pub b: String,
    pub distance: f64,
}

/// Settings for a run, loaded from a JSON file. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Structure property used as the hull's value axis.
    pub property: PropertyKey,
    /// Hull endpoints; derived from the pure structures when absent.
    pub endpoints: Option<Vec<String>>,
    /// Maximum distance to the hull still counted as stable.
    pub stability_tolerance: f64,

    pub separator: PointSeparator,

    // Species & separations
    pub species: Vec<Species>,
    pub covalent_scale: f64,
    pub pair_distances: Vec<PairDistance>,

    // Random structures
    pub box_size: f64,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            property: PropertyKey::ENTHALPY,
            endpoints: None,
            stability_tolerance: 1e-9,
            separator: PointSeparator::default(),
            species: vec![],
            covalent_scale: 0.75,
            pair_distances: vec![],
            box_size: 10.0,
            seed: 0,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialise config")?;
        fs::write(path, text).with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Species table with the explicit pair distances applied.
    pub fn species_database(&self) -> SpeciesDatabase {
        let mut db = SpeciesDatabase::new(&self.species, self.covalent_scale);
        for p in &self.pair_distances {
            db.set_pair_distance(&p.a, &p.b, p.distance);
        }
        db
    }
}
