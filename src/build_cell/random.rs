use log::{debug, info};
use nalgebra::Point3;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::build_cell::point_separator::{PointSeparator, SeparationData};
use crate::core::chemistry::{Composition, SpeciesDatabase};
use crate::core::domain::{Atom, Lattice, Structure};
use crate::core::spatial;
use crate::error::BuildError;

/// Builds random structures of a given stoichiometry: atoms are scattered
/// uniformly and then pulled apart with the point separator.
#[derive(Debug, Clone)]
pub struct RandomStructureBuilder<'a> {
    db: &'a SpeciesDatabase,
    box_size: f64,
    lattice: Option<Lattice>,
    separator: PointSeparator,
}

impl<'a> RandomStructureBuilder<'a> {
    pub fn new(db: &'a SpeciesDatabase) -> Self {
        Self {
            db,
            box_size: 10.0,
            lattice: None,
            separator: PointSeparator::default(),
        }
    }

    /// Edge length of the cube atoms are scattered in (clusters only).
    pub fn box_size(mut self, box_size: f64) -> Self {
        self.box_size = box_size;
        self
    }

    /// Makes the structure periodic; atoms are scattered over the whole cell.
    pub fn lattice(mut self, lattice: Lattice) -> Self {
        self.lattice = Some(lattice);
        self
    }

    pub fn separator(mut self, separator: PointSeparator) -> Self {
        self.separator = separator;
        self
    }

    pub fn build<R: Rng + ?Sized>(&self, stoichiometry: &Composition, rng: &mut R) -> Result<Structure, BuildError> {
        if self.lattice.is_none() && !(self.box_size > 0.0) {
            return Err(BuildError::InvalidBoxSize(self.box_size));
        }
        if let Some(unknown) = stoichiometry.species().find(|s| self.db.get(s).is_none()) {
            return Err(BuildError::UnknownSpecies(unknown.to_string()));
        }

        let mut structure = Structure::new(&format!("Random_{}", stoichiometry));
        structure.lattice = self.lattice.clone();

        // Exact multiset of species, shuffled to randomise the initial ordering.
        let mut to_place: Vec<&str> = Vec::new();
        for (species, count) in stoichiometry.iter() {
            for _ in 0..count {
                to_place.push(species);
            }
        }
        to_place.shuffle(rng);

        let half = self.box_size / 2.0;
        for species in to_place {
            let position = match &self.lattice {
                Some(lat) => lat.to_cartesian(&Point3::new(rng.gen(), rng.gen(), rng.gen())),
                None => Point3::new(
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                ),
            };
            structure.atoms.push(Atom::new(species, position));
        }

        let mut data = SeparationData::from_structure_with_species(&structure, self.db);
        if !self.separator.separate_points(&mut data) {
            debug!("Random {} could not be separated", stoichiometry);
            return Err(BuildError::SeparationFailed {
                max_iterations: self.separator.max_iterations,
            });
        }
        data.apply_to(&mut structure);
        spatial::wrap_or_center(&mut structure);

        info!("Built {} with {} atoms", structure.name, structure.num_atoms());
        Ok(structure)
    }
}
