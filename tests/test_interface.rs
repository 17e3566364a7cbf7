use std::fs;

use klmc_hull::analysis::convex_hull::ConvexHull;
use klmc_hull::analysis::stability;
use klmc_hull::config::{PairDistance, RunConfig};
use klmc_hull::core::domain::PropertyKey;
use klmc_hull::interface::{input, report};
use tempfile::tempdir;

use crate::common::{species, structure};

mod common;

#[test]
fn test_config_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.json");

    let mut config = RunConfig::default();
    config.endpoints = Some(vec!["Mg".into(), "O".into()]);
    config.property = PropertyKey::ENERGY;
    config.species = vec![species("Mg", 1.4), species("O", 0.6)];
    config.pair_distances.push(PairDistance {
        a: "O".into(),
        b: "Mg".into(),
        distance: 1.9,
    });
    config.separator.max_iterations = 50;
    config.save(&path).unwrap();

    let loaded = RunConfig::load(&path).unwrap();
    assert_eq!(loaded.endpoints, config.endpoints);
    assert_eq!(loaded.property, PropertyKey::ENERGY);
    assert_eq!(loaded.separator, config.separator);
    assert_eq!(loaded.pair_distances, config.pair_distances);

    let db = loaded.species_database();
    assert_eq!(db.pair_distance("Mg", "O"), Some(1.9));
    assert_eq!(db.pair_distance("O", "O"), Some(0.6 * 2.0 * 0.75));
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.json");
    fs::write(&path, r#"{ "separator": { "tolerance": 0.01 }, "seed": 5 }"#).unwrap();

    let config = RunConfig::load(&path).unwrap();
    assert_eq!(config.seed, 5);
    assert_eq!(config.separator.tolerance, 0.01);
    assert_eq!(config.separator.max_iterations, 1000);
    assert_eq!(config.property, PropertyKey::ENTHALPY);
    assert!(config.endpoints.is_none());

    fs::write(&path, "{ not json").unwrap();
    assert!(RunConfig::load(&path).is_err());
    assert!(RunConfig::load(&dir.path().join("missing.json")).is_err());
}

#[test]
fn test_structures_round_trip() {
    let dir = tempdir().unwrap();
    let one = dir.path().join("one.json");
    let many = dir.path().join("many.json");

    let s = structure("MgO", -12.5);
    input::save_structure(&s, &one).unwrap();
    let loaded = input::load_structure(&one).unwrap();
    assert_eq!(loaded.name, "MgO");
    assert_eq!(loaded.property(&PropertyKey::ENTHALPY), Some(-12.5));
    assert_eq!(loaded.composition(), s.composition());

    let text = serde_json::to_string(&vec![s.clone(), structure("Mg", -1.0)]).unwrap();
    fs::write(&many, text).unwrap();
    assert_eq!(input::load_structures(&many).unwrap().len(), 2);
    assert!(input::load_structure(&many).is_err());

    fs::write(&many, "42").unwrap();
    assert!(input::load_structures(&many).is_err());
}

#[test]
fn test_hull_report_csv() {
    let mut hull = ConvexHull::new(&["A", "B"]).unwrap();
    let names: Vec<String> = vec!["a".into(), "b".into(), "ab".into(), "a3b".into()];
    for (formula, value) in [("A", 0.0), ("B", 0.0), ("AB", -1.0), ("A3B", 0.0)] {
        hull.add_structure(&structure(formula, value)).unwrap();
    }

    let mut out = Vec::new();
    report::write_hull_report(&stability::summarise(&hull), &names, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[0],
        "id,name,formula,atoms,value,formation_per_atom,distance_to_hull,stable"
    );
    assert_eq!(lines[3], "2,ab,AB,2,-1.000000000,-0.500000000,0.000000000,true");
    assert_eq!(lines[4], "3,a3b,A3B,4,0.000000000,0.000000000,0.250000000,false");
}
