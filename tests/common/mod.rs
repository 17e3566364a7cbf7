#![allow(dead_code)]

use klmc_hull::core::chemistry::Composition;
use klmc_hull::core::domain::{PropertyKey, Species, Structure};

/// A structure with the given formula whose enthalpy is `value` (total, not per atom).
pub fn structure(formula: &str, value: f64) -> Structure {
    let composition: Composition = formula.parse().expect("test formula");
    Structure::from_composition(formula, &composition, PropertyKey::ENTHALPY, value)
}

/// Same composition but no enthalpy computed yet.
pub fn unrelaxed(formula: &str) -> Structure {
    let mut s = structure(formula, 0.0);
    s.properties.clear();
    s
}

pub fn species(symbol: &str, radius: f64) -> Species {
    Species {
        symbol: symbol.into(),
        radius_covalent: radius,
        ..Default::default()
    }
}
