use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, trace, warn};
use nalgebra::{DMatrix, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::chemistry::SpeciesDatabase;
use crate::core::domain::Structure;
use crate::core::spatial::{ClusterDistanceCalculator, DistanceCalculator};

/// Points to be pulled apart, the minimum separation required between every
/// pair, and which points may not move.
///
/// The separation matrix is always `n x n` and symmetric; only the points are
/// changed by `PointSeparator::separate_points`.
pub struct SeparationData {
    points: Vec<Point3<f64>>,
    separations: DMatrix<f64>,
    distance_calculator: Box<dyn DistanceCalculator>,
    fixed_points: BTreeSet<usize>,
}

impl fmt::Debug for SeparationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeparationData")
            .field("points", &self.points)
            .field("separations", &self.separations)
            .field("fixed_points", &self.fixed_points)
            .finish_non_exhaustive()
    }
}

impl SeparationData {
    /// `num_points` points at the origin with no separation constraints.
    pub fn new(num_points: usize, distance_calculator: Box<dyn DistanceCalculator>) -> Self {
        Self {
            points: vec![Point3::origin(); num_points],
            separations: DMatrix::zeros(num_points, num_points),
            distance_calculator,
            fixed_points: BTreeSet::new(),
        }
    }

    /// Non-periodic data for the given points.
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        let n = points.len();
        Self {
            points,
            separations: DMatrix::zeros(n, n),
            distance_calculator: Box::new(ClusterDistanceCalculator),
            fixed_points: BTreeSet::new(),
        }
    }

    /// Atom positions and geometry of `structure`; fixed atoms become fixed points.
    /// No separations are set.
    pub fn from_structure(structure: &Structure) -> Self {
        let n = structure.num_atoms();
        let fixed_points = structure
            .atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_fixed)
            .map(|(i, _)| i)
            .collect();
        Self {
            points: structure.positions(),
            separations: DMatrix::zeros(n, n),
            distance_calculator: structure.distance_calculator(),
            fixed_points,
        }
    }

    /// Like `from_structure`, with separations taken from the species pair table.
    pub fn from_structure_with_species(structure: &Structure, db: &SpeciesDatabase) -> Self {
        let mut data = Self::from_structure(structure);
        data.set_separations_from_labels(&structure.species_labels(), db);
        data
    }

    /// Fills the separation matrix from per-point species labels. Pairs with no
    /// entry in `db` are left unconstrained.
    pub fn set_separations_from_labels(&mut self, labels: &[&str], db: &SpeciesDatabase) {
        debug_assert_eq!(labels.len(), self.num_points());

        let species: BTreeSet<&str> = labels.iter().copied().collect();
        let mut table: BTreeMap<(&str, &str), f64> = BTreeMap::new();
        for (i, &a) in species.iter().enumerate() {
            for &b in species.iter().skip(i) {
                if let Some(d) = db.pair_distance(a, b) {
                    table.insert((a, b), d);
                }
            }
        }

        let n = labels.len().min(self.num_points());
        for i in 0..n {
            for j in (i + 1)..n {
                let key = if labels[i] <= labels[j] {
                    (labels[i], labels[j])
                } else {
                    (labels[j], labels[i])
                };
                let d = table.get(&key).copied().unwrap_or(0.0);
                self.set_separation(i, j, d);
            }
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.points
    }

    pub fn separation(&self, i: usize, j: usize) -> f64 {
        self.separations[(i, j)]
    }

    /// Sets the required separation of the unordered pair (i, j).
    pub fn set_separation(&mut self, i: usize, j: usize, distance: f64) {
        self.separations[(i, j)] = distance;
        self.separations[(j, i)] = distance;
    }

    /// Marks a point as immovable. Returns false if the index is out of range.
    pub fn fix_point(&mut self, i: usize) -> bool {
        if i >= self.num_points() {
            warn!("Ignoring fixed point {} of {}", i, self.num_points());
            return false;
        }
        self.fixed_points.insert(i);
        true
    }

    pub fn is_fixed(&self, i: usize) -> bool {
        self.fixed_points.contains(&i)
    }

    pub fn distance_calculator(&self) -> &dyn DistanceCalculator {
        self.distance_calculator.as_ref()
    }

    /// Copies the points back onto the atoms of `structure`.
    pub fn apply_to(&self, structure: &mut Structure) {
        debug_assert_eq!(structure.num_atoms(), self.num_points());
        for (atom, p) in structure.atoms.iter_mut().zip(&self.points) {
            atom.position = *p;
        }
    }
}

/// Resolves overlaps between points by iterative pairwise displacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointSeparator {
    pub max_iterations: usize,
    /// Largest acceptable overlap fraction `1 - actual/required` over all pairs.
    pub tolerance: f64,
}

impl PointSeparator {
    pub const DEFAULT_MAX_ITERATIONS: usize = 1000;
    pub const DEFAULT_TOLERANCE: f64 = 0.001;

    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Moves the points of `data` until every pair not both fixed is at least
    /// its required separation apart (within tolerance).
    ///
    /// Returns false if the iteration budget runs out first. Each iteration
    /// computes all pair displacements from the positions at its start and
    /// applies them together.
    pub fn separate_points(&self, data: &mut SeparationData) -> bool {
        let n = data.num_points();
        if n == 0 {
            return true;
        }

        let fixed = self.generate_fixed_list(data);
        let min_sep_sqs = data.separations.component_mul(&data.separations);
        let mut delta: Vec<Vector3<f64>> = vec![Vector3::zeros(); n];

        for iter in 0..self.max_iterations {
            let max_overlap = self.max_overlap_fraction(data, &min_sep_sqs, &fixed);
            trace!("Separation iteration {}: max overlap fraction {:.6}", iter, max_overlap);

            if max_overlap < self.tolerance {
                debug!("Points separated after {} iterations", iter);
                return true;
            }

            delta.iter_mut().for_each(|d| *d = Vector3::zeros());
            for row in 0..n - 1 {
                for col in (row + 1)..n {
                    if fixed[row] && fixed[col] {
                        continue;
                    }
                    let sep_vec = data
                        .distance_calculator
                        .vec_min_img(&data.points[row], &data.points[col]);
                    let sep_sq = sep_vec.norm_squared();
                    if sep_sq >= min_sep_sqs[(row, col)] {
                        continue;
                    }
                    if sep_sq == 0.0 {
                        // Coincident points have no direction to move along.
                        continue;
                    }

                    // One fixed: the other takes the full displacement
                    let prefactor = if fixed[row] || fixed[col] { 1.0 } else { 0.5 };
                    let sep = sep_sq.sqrt();
                    let sep_diff = data.separations[(row, col)] - sep;
                    let dr = sep_vec * (prefactor * sep_diff / sep);

                    if !fixed[row] {
                        delta[row] -= dr;
                    }
                    if !fixed[col] {
                        delta[col] += dr;
                    }
                }
            }

            for (p, d) in data.points.iter_mut().zip(&delta) {
                *p += *d;
            }
        }

        debug!("Point separation did not converge in {} iterations", self.max_iterations);
        false
    }

    fn generate_fixed_list(&self, data: &SeparationData) -> Vec<bool> {
        let mut fixed = vec![false; data.num_points()];
        for &i in &data.fixed_points {
            if let Some(f) = fixed.get_mut(i) {
                *f = true;
            }
        }
        fixed
    }

    /// `1 - 1/sqrt(max(required²/actual²))` over overlapping pairs, 0 if none overlap.
    fn max_overlap_fraction(&self, data: &SeparationData, min_sep_sqs: &DMatrix<f64>, fixed: &[bool]) -> f64 {
        let n = data.num_points();
        let mut max_ratio: f64 = 0.0;

        for row in 0..n.saturating_sub(1) {
            for col in (row + 1)..n {
                if fixed[row] && fixed[col] {
                    continue;
                }
                let sep_sq = data
                    .distance_calculator
                    .dist_sq_min_img(&data.points[row], &data.points[col]);
                if sep_sq < min_sep_sqs[(row, col)] {
                    max_ratio = max_ratio.max(min_sep_sqs[(row, col)] / sep_sq);
                }
            }
        }

        if max_ratio == 0.0 {
            0.0
        } else {
            1.0 - 1.0 / max_ratio.sqrt()
        }
    }
}

impl Default for PointSeparator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ITERATIONS, Self::DEFAULT_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_point_is_trivially_separated() {
        let mut data = SeparationData::from_points(vec![Point3::new(1.0, 2.0, 3.0)]);
        assert!(PointSeparator::default().separate_points(&mut data));
        assert_eq!(data.points()[0], Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn fix_point_rejects_out_of_range() {
        let mut data = SeparationData::from_points(vec![Point3::origin(); 2]);
        assert!(data.fix_point(1));
        assert!(!data.fix_point(2));
        assert!(data.is_fixed(1));
    }

    #[test]
    fn separation_matrix_stays_symmetric() {
        let mut data = SeparationData::from_points(vec![Point3::origin(); 3]);
        data.set_separation(0, 2, 1.5);
        assert_eq!(data.separation(2, 0), 1.5);
        assert_eq!(data.separation(0, 1), 0.0);
    }
}
