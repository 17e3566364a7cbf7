//! Exact linear programming over the lower envelope of a point set.
//!
//! The lowest point of conv(points) above a composition `x` is
//!
//! ```text
//! min  Σ λ_i v_i
//! s.t. Σ λ_i      = 1
//!      Σ λ_i x_i  = x
//!      λ_i       >= 0
//! ```
//!
//! solved with a dense two-phase simplex tableau in rational arithmetic.
//! Bland's rule keeps degenerate (coplanar) configurations from cycling.

use num_traits::{One, Signed, Zero};

use crate::analysis::exact::{HullPoint, Scalar};

/// The supporting facet below a composition.
#[derive(Debug, Clone, PartialEq)]
pub struct Support {
    /// Height of the lower envelope (value axis).
    pub height: Scalar,
    /// Caller ids of the points spanning the facet, with barycentric weights.
    pub weights: Vec<(usize, Scalar)>,
}

struct Tableau {
    rows: Vec<Vec<Scalar>>,
    rhs: Vec<Scalar>,
    basis: Vec<usize>,
}

impl Tableau {
    fn num_cols(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    fn reduced_cost(&self, cost: &[Scalar], col: usize) -> Scalar {
        let mut d = cost[col].clone();
        for (r, &b) in self.basis.iter().enumerate() {
            if !cost[b].is_zero() && !self.rows[r][col].is_zero() {
                d -= &cost[b] * &self.rows[r][col];
            }
        }
        d
    }

    fn objective(&self, cost: &[Scalar]) -> Scalar {
        self.basis
            .iter()
            .zip(&self.rhs)
            .fold(Scalar::zero(), |acc, (&b, v)| acc + &cost[b] * v)
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let p = self.rows[row][col].clone();
        for v in self.rows[row].iter_mut() {
            *v /= &p;
        }
        self.rhs[row] /= &p;

        let pivot_row = self.rows[row].clone();
        let pivot_rhs = self.rhs[row].clone();
        for r in 0..self.rows.len() {
            if r == row {
                continue;
            }
            let f = self.rows[r][col].clone();
            if f.is_zero() {
                continue;
            }
            for (v, pv) in self.rows[r].iter_mut().zip(&pivot_row) {
                if !pv.is_zero() {
                    *v -= &f * pv;
                }
            }
            self.rhs[r] -= &f * &pivot_rhs;
        }
        self.basis[row] = col;
    }

    /// Minimises `cost` over the current feasible basis. Returns false if unbounded.
    fn optimise(&mut self, cost: &[Scalar], allowed: impl Fn(usize) -> bool) -> bool {
        loop {
            // Bland: smallest improving column enters
            let entering = (0..self.num_cols()).find(|&j| {
                allowed(j) && !self.basis.contains(&j) && self.reduced_cost(cost, j).is_negative()
            });
            let Some(col) = entering else {
                return true;
            };

            // Ratio test, ties broken by smallest basic variable
            let mut leaving: Option<(usize, Scalar)> = None;
            for r in 0..self.rows.len() {
                if !self.rows[r][col].is_positive() {
                    continue;
                }
                let ratio = &self.rhs[r] / &self.rows[r][col];
                let better = match &leaving {
                    None => true,
                    Some((lr, best)) => ratio < *best || (ratio == *best && self.basis[r] < self.basis[*lr]),
                };
                if better {
                    leaving = Some((r, ratio));
                }
            }
            let Some((row, _)) = leaving else {
                return false;
            };
            self.pivot(row, col);
        }
    }
}

/// Lowest point of the convex hull of `points` at `target` composition.
///
/// `points` pairs a caller id with a hull point; every point must have
/// `target.len()` composition coordinates. Returns `None` if `target` lies
/// outside the composition range spanned by `points`.
pub fn lower_support(points: &[(usize, &HullPoint)], target: &[Scalar]) -> Option<Support> {
    let n = points.len();
    if n == 0 {
        return None;
    }
    let m = target.len() + 1;
    let cols = n + m;

    // Row 0: weights sum to one. Rows 1..m: composition balance.
    let mut rows = vec![vec![Scalar::zero(); cols]; m];
    let mut rhs = vec![Scalar::zero(); m];
    for (j, (_, p)) in points.iter().enumerate() {
        debug_assert_eq!(p.composition().len(), target.len());
        rows[0][j] = Scalar::one();
        for (k, x) in p.composition().iter().enumerate() {
            rows[k + 1][j] = x.clone();
        }
    }
    rhs[0] = Scalar::one();
    for (k, x) in target.iter().enumerate() {
        rhs[k + 1] = x.clone();
    }
    for r in 0..m {
        if rhs[r].is_negative() {
            for v in rows[r].iter_mut().take(n) {
                *v = -v.clone();
            }
            rhs[r] = -rhs[r].clone();
        }
        rows[r][n + r] = Scalar::one();
    }

    let mut t = Tableau {
        rows,
        rhs,
        basis: (n..cols).collect(),
    };

    // Phase 1: drive the artificial variables to zero.
    let mut phase_one = vec![Scalar::zero(); cols];
    for c in phase_one.iter_mut().skip(n) {
        *c = Scalar::one();
    }
    if !t.optimise(&phase_one, |_| true) {
        return None;
    }
    if t.objective(&phase_one).is_positive() {
        return None;
    }

    // Pivot zero-level artificials out of the basis; rows where that is impossible are redundant.
    let mut r = 0;
    while r < t.rows.len() {
        if t.basis[r] < n {
            r += 1;
            continue;
        }
        let replacement = (0..n).find(|&j| !t.basis.contains(&j) && !t.rows[r][j].is_zero());
        match replacement {
            Some(col) => {
                t.pivot(r, col);
                r += 1;
            }
            None => {
                t.rows.remove(r);
                t.rhs.remove(r);
                t.basis.remove(r);
            }
        }
    }

    // Phase 2: minimise the value axis.
    let mut phase_two = vec![Scalar::zero(); cols];
    for (j, (_, p)) in points.iter().enumerate() {
        phase_two[j] = p.value().clone();
    }
    if !t.optimise(&phase_two, |j| j < n) {
        return None;
    }

    let height = t.objective(&phase_two);
    let weights = t
        .basis
        .iter()
        .zip(&t.rhs)
        .filter(|(&b, w)| b < n && !w.is_zero())
        .map(|(&b, w)| (points[b].0, w.clone()))
        .collect();

    Some(Support { height, weights })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::exact::{from_count, ratio};

    fn pt(value: i32, x: Scalar) -> HullPoint {
        let v = if value < 0 {
            -from_count(value.unsigned_abs())
        } else {
            from_count(value as u32)
        };
        HullPoint::new(v, vec![x])
    }

    #[test]
    fn interpolates_between_two_vertices() {
        let a = pt(0, ratio(0, 1));
        let b = pt(-2, ratio(1, 1));
        let points = vec![(0, &a), (1, &b)];

        let s = lower_support(&points, &[ratio(1, 2)]).unwrap();
        assert_eq!(s.height, -from_count(1));
        assert_eq!(s.weights.len(), 2);
    }

    #[test]
    fn picks_the_lower_facet() {
        let a = pt(0, ratio(0, 1));
        let mid = pt(-3, ratio(1, 2));
        let b = pt(0, ratio(1, 1));
        let high = pt(5, ratio(1, 4));
        let points = vec![(0, &a), (1, &mid), (2, &b), (3, &high)];

        let s = lower_support(&points, &[ratio(1, 4)]).unwrap();
        // Halfway between (0, 0) and (1/2, -3)
        assert_eq!(s.height, -ratio(3, 2));
        let ids: Vec<usize> = s.weights.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&0) && ids.contains(&1));
    }

    #[test]
    fn outside_composition_range_is_none() {
        let a = pt(0, ratio(0, 1));
        let b = pt(0, ratio(1, 2));
        let points = vec![(0, &a), (1, &b)];
        assert!(lower_support(&points, &[ratio(3, 4)]).is_none());
    }

    #[test]
    fn duplicate_points_do_not_cycle() {
        let a = pt(0, ratio(0, 1));
        let b = pt(0, ratio(1, 1));
        let mid = pt(0, ratio(1, 2));
        let points = vec![(0, &a), (1, &b), (2, &mid), (3, &mid), (4, &a)];
        let s = lower_support(&points, &[ratio(1, 2)]).unwrap();
        assert!(s.height.is_zero());
    }
}
