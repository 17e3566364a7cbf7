use klmc_hull::build_cell::random::RandomStructureBuilder;
use klmc_hull::core::chemistry::{Composition, SpeciesDatabase};
use klmc_hull::core::domain::Lattice;
use klmc_hull::core::spatial;
use klmc_hull::error::{BuildError, FormulaError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::common::{species, structure};

mod common;

fn database(scale: f64) -> SpeciesDatabase {
    SpeciesDatabase::new(&[species("A", 1.0), species("B", 0.8)], scale)
}

#[test]
fn test_random_cluster_creation() {
    let db = database(0.75);
    let target: Composition = "A4B4".parse().unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let cluster = RandomStructureBuilder::new(&db)
        .box_size(4.0)
        .build(&target, &mut rng)
        .expect("Cluster creation failed");

    assert_eq!(cluster.atoms.len(), 8);
    assert!(cluster.check_stoichiometry(&target));
    assert!(cluster.lattice.is_none());
    // Separation stops within its tolerance, so check against slightly smaller radii.
    assert!(spatial::check_overlap(&cluster, &database(0.74)));

    let centroid = cluster.positions().iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / 8.0;
    assert!(centroid.norm() < 1e-9);
}

#[test]
fn test_random_periodic_creation() {
    let db = database(0.75);
    let target: Composition = "A2B2".parse().unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let crystal = RandomStructureBuilder::new(&db)
        .lattice(Lattice::cubic(6.0).unwrap())
        .build(&target, &mut rng)
        .unwrap();

    assert!(crystal.check_stoichiometry(&target));
    assert!(spatial::check_overlap(&crystal, &database(0.74)));
    for atom in &crystal.atoms {
        for x in atom.position.coords.iter() {
            assert!((0.0..=6.0).contains(x), "atom outside the cell: {}", atom.position);
        }
    }
}

#[test]
fn test_same_seed_same_structure() {
    let db = database(0.75);
    let target: Composition = "A3B".parse().unwrap();
    let builder = RandomStructureBuilder::new(&db);

    let a = builder.build(&target, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
    let b = builder.build(&target, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
    assert_eq!(a.positions(), b.positions());
    assert_eq!(a.species_labels(), b.species_labels());
}

#[test]
fn test_builder_rejects_bad_input() {
    let db = database(0.75);
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    let unknown = RandomStructureBuilder::new(&db).build(&"AC".parse().unwrap(), &mut rng);
    assert!(matches!(unknown, Err(BuildError::UnknownSpecies(s)) if s == "C"));

    let no_box = RandomStructureBuilder::new(&db)
        .box_size(0.0)
        .build(&"A".parse().unwrap(), &mut rng);
    assert!(matches!(no_box, Err(BuildError::InvalidBoxSize(_))));
}

#[test]
fn test_species_database() {
    let mut db = SpeciesDatabase::new(&[species("A", 2.0), species("B", 1.0)], 1.0);

    // (2+2)*1 = 4.0 -> sq = 16.0
    assert!((db.collision_sq("A", "A") - 16.0).abs() < 1e-6);
    // (2+1)*1 = 3.0 -> sq = 9.0
    assert!((db.collision_sq("A", "B") - 9.0).abs() < 1e-6);
    assert!((db.collision_sq("B", "A") - 9.0).abs() < 1e-6);

    db.set_pair_distance("B", "A", 1.5);
    assert_eq!(db.pair_distance("A", "B"), Some(1.5));
    assert_eq!(db.pair_distance("B", "B"), Some(2.0));
    assert_eq!(db.pair_distance("A", "Z"), None);
    assert_eq!(db.collision_sq("Z", "Z"), 0.0);
}

#[test]
fn test_formula_parsing() {
    let c: Composition = "Al2MgO4".parse().unwrap();
    assert_eq!(c.count("Al"), 2);
    assert_eq!(c.count("Mg"), 1);
    assert_eq!(c.count("O"), 4);
    assert_eq!(c.num_atoms(), 7);
    assert_eq!(c.to_string(), "Al2MgO4");

    assert_eq!("".parse::<Composition>(), Err(FormulaError::Empty));
    assert!(matches!("Mg 2".parse::<Composition>(), Err(FormulaError::UnexpectedToken(_))));
    assert!(matches!("mgO".parse::<Composition>(), Err(FormulaError::UnexpectedToken(_))));
    assert_eq!(
        "Mg4294967295O".parse::<Composition>(),
        Err(FormulaError::CountOverflow { species: "O".into() })
    );
}

#[test]
fn test_structure_composition() {
    let s = structure("Mg2O2", -10.0);
    assert_eq!(s.num_atoms(), 4);
    assert!(s.check_stoichiometry(&"O2Mg2".parse().unwrap()));
    assert!(!s.check_stoichiometry(&"MgO".parse().unwrap()));
    assert_eq!(s.composition().single_species(), None);
    assert_eq!(structure("O3", 0.0).composition().single_species(), Some("O"));
}
