use std::collections::{BTreeMap, HashSet};

use log::{debug, trace};
use num_traits::{One, Zero};
use rayon::prelude::*;

use crate::analysis::exact::{self, HullPoint, Scalar};
use crate::analysis::simplex::{self, Support};

/// Index of a hull entry.
pub type EntryId = usize;

/// A lower-hull facet located below some composition.
#[derive(Debug, Clone, PartialEq)]
pub struct HullFacet {
    /// Vertices spanning the facet with their barycentric weights.
    pub vertices: Vec<(EntryId, f64)>,
    /// Interpolated value-axis height of the facet at the queried composition.
    pub height: f64,
}

/// The lower convex hull of a set of points, built in exact arithmetic.
///
/// Points can be appended with `insert`. `ConvexHull` only rebuilds from
/// scratch when the embedding itself changes (a chemical potential drops).
#[derive(Debug, Clone)]
pub struct Hull {
    dims: usize,
    points: Vec<HullPoint>,
    vertices: Vec<EntryId>,
    stable_points: HashSet<HullPoint>,
}

impl Hull {
    /// Builds the hull of `points`, where `points[id]` is the point of entry `id`.
    pub fn new(dims: usize, points: Vec<HullPoint>) -> Self {
        debug_assert!(points.iter().all(|p| p.dims() == dims));

        let candidates = lowest_per_composition(&points, 0..points.len());
        let shortlist = shortlist(&points, &candidates);
        let vertices = lower_vertices(&points, &shortlist);

        debug!(
            "Built {}-D hull: {} points, {} candidates, {} shortlisted, {} stable vertices",
            dims,
            points.len(),
            candidates.len(),
            shortlist.len(),
            vertices.len()
        );

        let mut hull = Self {
            dims,
            points,
            vertices: Vec::new(),
            stable_points: HashSet::new(),
        };
        hull.set_vertices(vertices);
        hull
    }

    /// Appends the point of the next entry and returns its id.
    ///
    /// The vertex set is recomputed, from the current vertices plus the new
    /// point, only when the point lies strictly below the envelope.
    pub fn insert(&mut self, point: HullPoint) -> EntryId {
        debug_assert_eq!(point.dims(), self.dims);
        let id = self.points.len();
        self.points.push(point);

        if self.below_envelope(id) {
            let candidates = lowest_per_composition(
                &self.points,
                self.vertices.iter().copied().chain(std::iter::once(id)),
            );
            let vertices = lower_vertices(&self.points, &candidates);
            trace!("Point {} reshaped the hull: {} stable vertices", id, vertices.len());
            self.set_vertices(vertices);
        }
        id
    }

    fn set_vertices(&mut self, vertices: Vec<EntryId>) {
        self.stable_points = vertices.iter().map(|&v| self.points[v].clone()).collect();
        self.vertices = vertices;
    }

    fn below_envelope(&self, id: EntryId) -> bool {
        let p = &self.points[id];
        match self.support_at(p.composition()) {
            Some(support) => p.value() < &support.height,
            None => true,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, id: EntryId) -> Option<&HullPoint> {
        self.points.get(id)
    }

    /// Ids of the lower-hull vertices, one per distinct stable point.
    pub fn vertices(&self) -> &[EntryId] {
        &self.vertices
    }

    /// True iff `point` coincides with a vertex of the lower hull.
    pub fn is_vertex(&self, point: &HullPoint) -> bool {
        self.stable_points.contains(point)
    }

    fn support_at(&self, composition: &[Scalar]) -> Option<Support> {
        if composition.len() + 1 != self.dims {
            return None;
        }
        let vertices: Vec<(usize, &HullPoint)> =
            self.vertices.iter().map(|&v| (v, &self.points[v])).collect();
        simplex::lower_support(&vertices, composition)
    }

    /// Exact height of the lower envelope at `composition`, if it lies inside the hull's range.
    pub fn height_at(&self, composition: &[Scalar]) -> Option<Scalar> {
        self.support_at(composition).map(|s| s.height)
    }

    /// The stable facet whose composition projection contains `composition`.
    pub fn facet_at(&self, composition: &[Scalar]) -> Option<HullFacet> {
        let support = self.support_at(composition)?;
        Some(HullFacet {
            vertices: support
                .weights
                .iter()
                .map(|(id, w)| (*id, exact::to_f64(w)))
                .collect(),
            height: exact::to_f64(&support.height),
        })
    }

    /// Vertical distance from `point` down to the lower envelope (negative if below it).
    pub fn distance(&self, point: &HullPoint) -> Option<Scalar> {
        let height = self.height_at(point.composition())?;
        Some(point.value() - height)
    }
}

/// Lowest point at each distinct composition among `ids` (ties go to the
/// smaller id), sorted by id. Only these can touch the lower envelope.
fn lowest_per_composition(points: &[HullPoint], ids: impl IntoIterator<Item = EntryId>) -> Vec<EntryId> {
    let mut lowest: BTreeMap<&[Scalar], EntryId> = BTreeMap::new();
    for id in ids {
        let p = &points[id];
        lowest
            .entry(p.composition())
            .and_modify(|best| {
                let b = points[*best].value();
                if p.value() < b || (p.value() == b && id < *best) {
                    *best = id;
                }
            })
            .or_insert(id);
    }
    let mut candidates: Vec<EntryId> = lowest.into_values().collect();
    candidates.sort_unstable();
    candidates
}

fn is_corner(p: &HullPoint) -> bool {
    let c = p.composition();
    c.iter().all(Zero::is_zero) || c.iter().any(One::is_one)
}

/// A superset of the lower vertices among `candidates`, sorted by id.
///
/// Candidates are visited corners first, then from the lowest value up, and
/// kept unless they lie on or above the envelope of those kept so far. That
/// envelope is never below the full one, so only non-vertices are dropped, and
/// every dropped point lies inside the hull of the kept ones.
fn shortlist(points: &[HullPoint], candidates: &[EntryId]) -> Vec<EntryId> {
    let mut order = candidates.to_vec();
    order.sort_by(|&a, &b| {
        is_corner(&points[b])
            .cmp(&is_corner(&points[a]))
            .then_with(|| points[a].value().cmp(points[b].value()))
            .then(a.cmp(&b))
    });

    let mut kept: Vec<EntryId> = Vec::new();
    for c in order {
        let support = {
            let others: Vec<(usize, &HullPoint)> = kept.iter().map(|&k| (k, &points[k])).collect();
            simplex::lower_support(&others, points[c].composition())
        };
        let keep = match support {
            Some(support) => points[c].value() < &support.height,
            None => true,
        };
        if keep {
            kept.push(c);
        }
    }
    kept.sort_unstable();
    kept
}

/// The candidates lying strictly below the envelope of all the other candidates.
fn lower_vertices(points: &[HullPoint], candidates: &[EntryId]) -> Vec<EntryId> {
    candidates
        .par_iter()
        .copied()
        .filter(|&c| {
            let others: Vec<(usize, &HullPoint)> = candidates
                .iter()
                .filter(|&&o| o != c)
                .map(|&o| (o, &points[o]))
                .collect();
            match simplex::lower_support(&others, points[c].composition()) {
                Some(support) => points[c].value() < &support.height,
                None => true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::analysis::exact::{from_count, from_f64, ratio};

    /// Random ternary points on a coarse composition grid, so compositions repeat.
    fn ternary_points(n: usize, seed: u64) -> Vec<HullPoint> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut points: Vec<HullPoint> = [(0, 0), (4, 0), (0, 4)]
            .into_iter()
            .map(|(b, c)| HullPoint::new(Scalar::zero(), vec![ratio(b, 4), ratio(c, 4)]))
            .collect();
        while points.len() < n {
            let (a, b, c): (u32, u32, u32) = (rng.gen_range(0..5), rng.gen_range(0..5), rng.gen_range(0..5));
            let total = a + b + c;
            if total == 0 {
                continue;
            }
            let value = from_f64(rng.gen_range(-1.0..0.25)).unwrap();
            points.push(HullPoint::new(value, vec![ratio(b, total), ratio(c, total)]));
        }
        points
    }

    /// Every lowest-per-composition point tested against all the others.
    fn vertices_by_exhaustion(points: &[HullPoint]) -> Vec<EntryId> {
        let candidates = lowest_per_composition(points, 0..points.len());
        lower_vertices(points, &candidates)
    }

    #[test]
    fn shortlist_keeps_every_vertex() {
        let points = ternary_points(120, 3);
        let candidates = lowest_per_composition(&points, 0..points.len());
        let short = shortlist(&points, &candidates);
        let expected = vertices_by_exhaustion(&points);

        assert!(short.len() <= candidates.len());
        assert!(expected.iter().all(|v| short.contains(v)));
        assert_eq!(Hull::new(3, points).vertices(), expected.as_slice());
    }

    #[test]
    fn insertion_matches_full_build() {
        for seed in [1, 7, 11] {
            let points = ternary_points(80, seed);
            let full = Hull::new(3, points.clone());

            let mut grown = Hull::new(3, points[..3].to_vec());
            for p in &points[3..] {
                grown.insert(p.clone());
            }

            assert_eq!(grown.num_points(), full.num_points());
            assert_eq!(grown.vertices(), full.vertices(), "seed {}", seed);
            for p in &points {
                assert_eq!(grown.distance(p), full.distance(p));
            }
        }
    }

    #[test]
    fn duplicate_vertex_keeps_the_first_id() {
        let a = HullPoint::new(Scalar::zero(), vec![ratio(0, 1)]);
        let b = HullPoint::new(Scalar::zero(), vec![ratio(1, 1)]);
        let mid = HullPoint::new(-Scalar::one(), vec![ratio(1, 2)]);

        let mut hull = Hull::new(2, vec![a, b, mid.clone()]);
        assert_eq!(hull.vertices(), &[0, 1, 2]);

        assert_eq!(hull.insert(mid.clone()), 3);
        assert_eq!(hull.vertices(), &[0, 1, 2]);
        assert!(hull.is_vertex(&mid));

        // Strictly below: the old midpoint is replaced.
        hull.insert(HullPoint::new(-from_count(2), vec![ratio(1, 2)]));
        assert_eq!(hull.vertices(), &[0, 1, 4]);
        assert!(!hull.is_vertex(&mid));
    }
}
