use nalgebra::{Point3, Vector3};

use crate::core::chemistry::SpeciesDatabase;
use crate::core::domain::{Lattice, Structure};

/// Minimum-image geometry used by the point separator and overlap checks.
/// Implementations must be Thread-Safe (Sync).
pub trait DistanceCalculator: Send + Sync {
    /// Shortest displacement vector pointing from `a` to `b`.
    fn vec_min_img(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64>;

    fn dist_sq_min_img(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        self.vec_min_img(a, b).norm_squared()
    }
}

/// Non-periodic (0D) geometry: plain Euclidean distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterDistanceCalculator;

impl DistanceCalculator for ClusterDistanceCalculator {
    #[inline]
    fn vec_min_img(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64> {
        b - a
    }

    #[inline]
    fn dist_sq_min_img(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        nalgebra::distance_squared(a, b)
    }
}

/// Periodic (3D) geometry under the Minimum Image Convention.
#[derive(Debug, Clone)]
pub struct PeriodicDistanceCalculator {
    lattice: Lattice,
}

impl PeriodicDistanceCalculator {
    pub fn new(lattice: Lattice) -> Self {
        Self { lattice }
    }
}

impl DistanceCalculator for PeriodicDistanceCalculator {
    fn vec_min_img(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64> {
        // Wrap fractional delta to [-0.5, 0.5]
        let d_cart = b - a;
        let mut d_frac = self.lattice.inverse * d_cart;
        d_frac.x -= d_frac.x.round();
        d_frac.y -= d_frac.y.round();
        d_frac.z -= d_frac.z.round();

        let wrapped = self.lattice.vectors * d_frac;

        // Rounding alone is not enough for skewed cells, check the neighbouring images.
        let mut best = wrapped;
        let mut best_sq = wrapped.norm_squared();
        for i in -1..=1 {
            for j in -1..=1 {
                for k in -1..=1 {
                    if i == 0 && j == 0 && k == 0 {
                        continue;
                    }
                    let shift = Vector3::new(i as f64, j as f64, k as f64);
                    let candidate = wrapped + self.lattice.vectors * shift;
                    let sq = candidate.norm_squared();
                    if sq < best_sq {
                        best_sq = sq;
                        best = candidate;
                    }
                }
            }
        }
        best
    }
}

pub fn distance_calculator(lattice: Option<&Lattice>) -> Box<dyn DistanceCalculator> {
    match lattice {
        Some(lat) => Box::new(PeriodicDistanceCalculator::new(lat.clone())),
        None => Box::new(ClusterDistanceCalculator),
    }
}

/// Checks a structure for any physical overlaps (hard collisions).
/// Returns `true` if the structure is valid (no overlaps).
pub fn check_overlap(structure: &Structure, db: &SpeciesDatabase) -> bool {
    let atoms = &structure.atoms;
    let calc = structure.distance_calculator();

    for i in 0..atoms.len() {
        for j in (i + 1)..atoms.len() {
            let threshold_sq = db.collision_sq(&atoms[i].species, &atoms[j].species);
            let dist_sq = calc.dist_sq_min_img(&atoms[i].position, &atoms[j].position);

            // Small slack so freshly separated structures are not flagged by rounding.
            if dist_sq < threshold_sq * (1.0 - 1e-6) {
                return false;
            }
        }
    }
    true
}

/// Moves atoms into the primary unit cell (Periodic only) or centers them (0D).
///
/// **Invariant**: Modifies positions in-place. Does NOT reorder atoms.
pub fn wrap_or_center(structure: &mut Structure) {
    if let Some(lat) = &structure.lattice {
        for atom in &mut structure.atoms {
            let mut frac = lat.to_fractional(&atom.position);
            frac.coords.x = frac.coords.x.rem_euclid(1.0);
            frac.coords.y = frac.coords.y.rem_euclid(1.0);
            frac.coords.z = frac.coords.z.rem_euclid(1.0);
            atom.position = lat.to_cartesian(&frac);
        }
    } else {
        let n = structure.atoms.len() as f64;
        if n == 0.0 {
            return;
        }

        let mut center = Vector3::zeros();
        for atom in &structure.atoms {
            center += atom.position.coords;
        }
        center /= n;

        for atom in &mut structure.atoms {
            atom.position -= center;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_image_is_shortest() {
        let lattice = Lattice::cubic(10.0).unwrap();
        let calc = PeriodicDistanceCalculator::new(lattice);
        let a = Point3::new(0.5, 0.0, 0.0);
        let b = Point3::new(9.5, 0.0, 0.0);

        let v = calc.vec_min_img(&a, &b);
        assert!((v.x + 1.0).abs() < 1e-12);
        assert!((calc.dist_sq_min_img(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn skewed_cell_checks_neighbour_images() {
        let lattice = Lattice::new(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.9, 0.3, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        )
        .unwrap();
        let calc = PeriodicDistanceCalculator::new(lattice.clone());
        let a = Point3::origin();
        let b = lattice.to_cartesian(&Point3::new(0.45, 0.45, 0.0));

        // Brute force over a wide range of images.
        let mut brute = f64::MAX;
        for i in -3..=3 {
            for j in -3..=3 {
                let shift = lattice.vectors * Vector3::new(i as f64, j as f64, 0.0);
                brute = brute.min((b.coords + shift).norm_squared());
            }
        }
        assert!((calc.dist_sq_min_img(&a, &b) - brute).abs() < 1e-12);
    }

    #[test]
    fn cluster_center_is_origin() {
        let mut s = Structure::new("pair");
        s.atoms.push(crate::core::domain::Atom::new("A", Point3::new(1.0, 1.0, 1.0)));
        s.atoms.push(crate::core::domain::Atom::new("A", Point3::new(3.0, 1.0, 1.0)));
        wrap_or_center(&mut s);
        assert!((s.atoms[0].position.x + 1.0).abs() < 1e-12);
        assert!(s.atoms[1].position.y.abs() < 1e-12);
    }
}
