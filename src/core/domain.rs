use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::chemistry::Composition;
use crate::core::spatial::{self, DistanceCalculator};

// --- Physics Types ---

/// Represents a single chemical element/species properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub symbol: String,
    #[serde(default)]
    pub atomic_number: u8,
    #[serde(default = "default_mass")]
    pub mass: f64,            // amu
    #[serde(default = "default_radius")]
    pub radius_covalent: f64, // Å
}

fn default_mass() -> f64 {
    1.0
}

fn default_radius() -> f64 {
    1.0
}

impl Default for Species {
    fn default() -> Self {
        Self {
            symbol: "X".to_string(),
            atomic_number: 0,
            mass: default_mass(),
            radius_covalent: default_radius(),
        }
    }
}

/// A single atom instance in a structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub species: String,
    pub position: Point3<f64>,
    #[serde(default)]
    pub is_fixed: bool,
}

impl Atom {
    pub fn new(species: &str, position: Point3<f64>) -> Self {
        Self {
            species: species.to_string(),
            position,
            is_fixed: false,
        }
    }
}

/// Defines the Periodic Boundary Conditions (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub vectors: Matrix3<f64>, // Columns are a, b, c
    pub inverse: Matrix3<f64>, // Precomputed for fractional conversion
}

impl Lattice {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Option<Self> {
        let vectors = Matrix3::from_columns(&[a, b, c]);
        let inverse = vectors.try_inverse()?;
        Some(Self { vectors, inverse })
    }

    pub fn cubic(length: f64) -> Option<Self> {
        Self::new(
            Vector3::new(length, 0.0, 0.0),
            Vector3::new(0.0, length, 0.0),
            Vector3::new(0.0, 0.0, length),
        )
    }

    pub fn to_fractional(&self, p: &Point3<f64>) -> Point3<f64> {
        let v = self.inverse * p.coords;
        Point3::from(v)
    }

    pub fn to_cartesian(&self, p: &Point3<f64>) -> Point3<f64> {
        let v = self.vectors * p.coords;
        Point3::from(v)
    }
}

/// Names a scalar property attached to a structure (e.g. the enthalpy that a
/// relaxation produced).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyKey(Cow<'static, str>);

impl PropertyKey {
    pub const ENTHALPY: PropertyKey = PropertyKey(Cow::Borrowed("enthalpy"));
    pub const ENERGY: PropertyKey = PropertyKey(Cow::Borrowed("energy"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }
}

impl Default for PropertyKey {
    fn default() -> Self {
        Self::ENTHALPY
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- The Core Entity ---

/// A candidate structure as it flows through the search: atoms, an optional
/// cell and whatever scalar properties have been computed so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Structure {
    pub name: String,
    #[serde(default)]
    pub atoms: Vec<Atom>,
    #[serde(default)]
    pub lattice: Option<Lattice>,
    #[serde(default)]
    pub properties: BTreeMap<PropertyKey, f64>,
}

impl Structure {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// A structure carrying only a composition and a value, with every atom at
    /// the origin. Handy when only the hull bookkeeping matters.
    pub fn from_composition(name: &str, composition: &Composition, key: PropertyKey, value: f64) -> Self {
        let mut s = Structure::new(name);
        for (species, count) in composition.iter() {
            for _ in 0..count {
                s.atoms.push(Atom::new(species, Point3::origin()));
            }
        }
        s.properties.insert(key, value);
        s
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn composition(&self) -> Composition {
        let mut c = Composition::new();
        for atom in &self.atoms {
            c.add(&atom.species, 1);
        }
        c
    }

    pub fn property(&self, key: &PropertyKey) -> Option<f64> {
        self.properties.get(key).copied()
    }

    pub fn set_property(&mut self, key: PropertyKey, value: f64) {
        self.properties.insert(key, value);
    }

    /// Species label of every atom, in atom order.
    pub fn species_labels(&self) -> Vec<&str> {
        self.atoms.iter().map(|a| a.species.as_str()).collect()
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    pub fn distance_calculator(&self) -> Box<dyn DistanceCalculator> {
        spatial::distance_calculator(self.lattice.as_ref())
    }

    /// Verifies if the structure matches the target stoichiometry exactly.
    pub fn check_stoichiometry(&self, target: &Composition) -> bool {
        let actual = self.composition();
        let matches = actual
            .species()
            .chain(target.species())
            .all(|s| actual.count(s) == target.count(s));
        matches
    }
}
