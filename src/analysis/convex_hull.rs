use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use nalgebra::DVector;
use num_traits::Zero;

use crate::analysis::exact::{self, HullPoint, Scalar};
use crate::analysis::hull::{EntryId, Hull};
use crate::core::chemistry::Composition;
use crate::core::domain::{PropertyKey, Structure};
use crate::error::HullError;

/// Anything that can be placed on a convex hull: a composition plus a lookup
/// for the scalar property forming the hull's value axis.
pub trait HullCandidate {
    fn num_atoms(&self) -> usize;
    fn composition(&self) -> Composition;
    /// `None` if the property has not been computed.
    fn property(&self, key: &PropertyKey) -> Option<f64>;
}

impl HullCandidate for Structure {
    fn num_atoms(&self) -> usize {
        Structure::num_atoms(self)
    }

    fn composition(&self) -> Composition {
        Structure::composition(self)
    }

    fn property(&self, key: &PropertyKey) -> Option<f64> {
        Structure::property(self, key)
    }
}

/// A pure species anchoring one vertex of the composition simplex.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub label: String,
    /// Position on the regular (unit edge) simplex.
    pub simplex: DVector<f64>,
}

/// One structure's data point on the hull.
#[derive(Debug, Clone, PartialEq)]
pub struct HullEntry {
    id: EntryId,
    composition: Composition,
    value: f64,
    is_endpoint: bool,
}

impl HullEntry {
    fn new(id: EntryId, composition: Composition, value: f64) -> Self {
        let is_endpoint = composition.single_species().is_some();
        Self {
            id,
            composition,
            value,
            is_endpoint,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Property value of the whole structure (not per atom).
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_endpoint(&self) -> bool {
        self.is_endpoint
    }
}

/// Endpoints are single species: "Mg" is accepted, "MgO" or "O2" are not.
fn is_species_label(label: &str) -> bool {
    match label.parse::<Composition>() {
        Ok(c) => c.num_atoms() == 1 && c.count(label) == 1,
        Err(_) => false,
    }
}

/// Convex hull over composition/value space.
///
/// Hull coordinate 0 is the formation value per atom relative to the chemical
/// potentials; the remaining coordinates place the composition on the simplex
/// spanned by the endpoints. The hull itself is built lazily on first query,
/// extended as entries are added and rebuilt when a chemical potential drops.
///
/// Not `Sync`: the lazily built hull lives in a `OnceCell`.
#[derive(Debug)]
pub struct ConvexHull {
    endpoints: Vec<Endpoint>,
    convex_property: PropertyKey,
    chemical_potentials: BTreeMap<String, Scalar>,
    entries: Vec<HullEntry>,
    exact_values: Vec<Scalar>,
    hull: OnceCell<Hull>,
}

impl ConvexHull {
    /// Hull over `labels` using the enthalpy as value axis.
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Result<Self, HullError> {
        Self::with_property(labels, PropertyKey::ENTHALPY)
    }

    pub fn with_property<S: AsRef<str>>(labels: &[S], convex_property: PropertyKey) -> Result<Self, HullError> {
        if labels.len() < 2 {
            return Err(HullError::TooFewEndpoints(labels.len()));
        }
        let mut seen = BTreeSet::new();
        for l in labels {
            if !is_species_label(l.as_ref()) {
                return Err(HullError::CompoundEndpoint(l.as_ref().to_string()));
            }
            if !seen.insert(l.as_ref()) {
                return Err(HullError::DuplicateEndpoint(l.as_ref().to_string()));
            }
        }

        let endpoints = labels
            .iter()
            .zip(simplex_vertices(labels.len()))
            .map(|(l, simplex)| Endpoint {
                label: l.as_ref().to_string(),
                simplex,
            })
            .collect();

        Ok(Self {
            endpoints,
            convex_property,
            chemical_potentials: BTreeMap::new(),
            entries: Vec::new(),
            exact_values: Vec::new(),
            hull: OnceCell::new(),
        })
    }

    /// Sorted set of species that appear as single-species structures.
    pub fn generate_endpoints<'a, C, I>(structures: I) -> Vec<String>
    where
        C: HullCandidate + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        let mut species = BTreeSet::new();
        for s in structures {
            if let Some(single) = s.composition().single_species() {
                species.insert(single.to_string());
            }
        }
        species.into_iter().collect()
    }

    /// Builds the endpoints from the pure structures in `structures` and adds them all.
    pub fn from_structures<C: HullCandidate>(structures: &[C]) -> Result<Self, HullError> {
        let labels = Self::generate_endpoints(structures);
        let mut hull = Self::new(&labels)?;
        hull.add_structures(structures)?;
        Ok(hull)
    }

    /// Number of hull dimensions, including the value axis.
    pub fn dims(&self) -> usize {
        self.endpoints.len()
    }

    pub fn convex_property(&self) -> &PropertyKey {
        &self.convex_property
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn entries(&self) -> &[HullEntry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&HullEntry> {
        self.entries.get(id)
    }

    pub fn chemical_potential(&self, species: &str) -> Option<f64> {
        self.chemical_potentials.get(species).map(exact::to_f64)
    }

    /// Adds a structure, returning its entry id.
    ///
    /// Structures with no atoms or without the hull property yield `Ok(None)`
    /// and are not stored.
    pub fn add_structure<C: HullCandidate + ?Sized>(&mut self, structure: &C) -> Result<Option<EntryId>, HullError> {
        if structure.num_atoms() == 0 {
            return Ok(None);
        }
        let Some(value) = structure.property(&self.convex_property) else {
            debug!("Structure has no '{}' value, not adding it to the hull", self.convex_property);
            return Ok(None);
        };
        let exact_value = exact::from_f64(value).ok_or(HullError::NonFiniteValue(value))?;

        let composition = structure.composition();
        if composition.is_empty() {
            return Ok(None);
        }
        if let Some(foreign) = composition.species().find(|s| self.endpoint_index(s).is_none()) {
            return Err(HullError::ForeignSpecies {
                species: foreign.to_string(),
            });
        }

        let id = self.entries.len();
        let entry = HullEntry::new(id, composition, value);
        if let Some(species) = entry.composition.single_species() {
            let per_atom = &exact_value / exact::from_count(entry.composition.num_atoms());
            self.update_chemical_potential(species.to_string(), per_atom);
        }
        self.entries.push(entry);
        self.exact_values.push(exact_value);
        self.extend_hull(id);
        Ok(Some(id))
    }

    pub fn add_structures<'a, C, I>(&mut self, structures: I) -> Result<Vec<Option<EntryId>>, HullError>
    where
        C: HullCandidate + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        structures.into_iter().map(|s| self.add_structure(s)).collect()
    }

    /// Like `add_structures`, but structures with species outside the
    /// endpoints are skipped with a warning instead of failing the batch.
    pub fn add_compatible_structures<'a, C, I>(&mut self, structures: I) -> Result<Vec<Option<EntryId>>, HullError>
    where
        C: HullCandidate + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        structures
            .into_iter()
            .map(|s| match self.add_structure(s) {
                Err(HullError::ForeignSpecies { species }) => {
                    warn!("Skipping structure containing '{}', which is not a hull endpoint", species);
                    Ok(None)
                }
                other => other,
            })
            .collect()
    }

    fn update_chemical_potential(&mut self, species: String, per_atom: Scalar) {
        match self.chemical_potentials.get_mut(&species) {
            None => {
                debug!("Chemical potential for {} set to {:.6}", species, exact::to_f64(&per_atom));
                self.chemical_potentials.insert(species, per_atom);
            }
            Some(mu) if per_atom < *mu => {
                debug!(
                    "Chemical potential for {} lowered {:.6} -> {:.6}",
                    species,
                    exact::to_f64(mu),
                    exact::to_f64(&per_atom)
                );
                *mu = per_atom;
                // Every embedding depends on the potentials.
                self.hull.take();
            }
            Some(_) => {}
        }
    }

    /// Adds the point of entry `id` to the cached hull, if there is one.
    fn extend_hull(&mut self, id: EntryId) {
        let point = self.embed_exact(&self.entries[id].composition, &self.exact_values[id]);
        match (self.hull.get_mut(), point) {
            (Some(hull), Some(point)) => {
                let inserted = hull.insert(point);
                debug_assert_eq!(inserted, id);
            }
            _ => {
                self.hull.take();
            }
        }
    }

    fn endpoint_index(&self, species: &str) -> Option<usize> {
        self.endpoints.iter().position(|e| e.label == species)
    }

    /// True once every endpoint has a chemical potential.
    pub fn can_generate(&self) -> bool {
        self.chemical_potentials.len() == self.endpoints.len()
    }

    /// The hull, built on demand. `None` until every endpoint has been seen.
    pub fn hull(&self) -> Option<&Hull> {
        if let Some(h) = self.hull.get() {
            return Some(h);
        }
        if !self.can_generate() {
            return None;
        }
        Some(self.hull.get_or_init(|| self.generate_hull()))
    }

    fn generate_hull(&self) -> Hull {
        let points = self
            .entries
            .iter()
            .zip(&self.exact_values)
            .filter_map(|(e, v)| self.embed_exact(&e.composition, v))
            .collect::<Vec<_>>();
        debug_assert_eq!(points.len(), self.entries.len());
        info!("Generating {}-D convex hull from {} entries", self.dims(), points.len());
        Hull::new(self.dims(), points)
    }

    /// Hull point for `composition` carrying a total `value`, or `None` if the
    /// composition is empty, contains foreign species or a potential is missing.
    pub fn embed(&self, composition: &Composition, value: f64) -> Option<HullPoint> {
        let exact_value = exact::from_f64(value)?;
        self.embed_exact(composition, &exact_value)
    }

    // Composition axes are the fractions of endpoints 1..N; this is an affine image of the
    // regular simplex embedding, so vertices and vertical distances are unchanged while
    // every coordinate stays rational.
    fn embed_exact(&self, composition: &Composition, value: &Scalar) -> Option<HullPoint> {
        if composition.species().any(|s| self.endpoint_index(s).is_none()) {
            return None;
        }
        let total = composition.num_atoms();
        if total == 0 {
            return None;
        }

        let mut mu_n = Scalar::zero();
        for endpoint in &self.endpoints {
            let n = composition.count(&endpoint.label);
            if n != 0 {
                let mu = self.chemical_potentials.get(&endpoint.label)?;
                mu_n += mu * exact::from_count(n);
            }
        }
        let formation = (value - mu_n) / exact::from_count(total);

        let fractions = self.endpoints[1..]
            .iter()
            .map(|e| exact::ratio(composition.count(&e.label), total))
            .collect();

        Some(HullPoint::new(formation, fractions))
    }

    /// Hull point of a stored entry.
    pub fn hull_point(&self, id: EntryId) -> Option<HullPoint> {
        if let Some(h) = self.hull.get() {
            return h.point(id).cloned();
        }
        let entry = self.entries.get(id)?;
        self.embed_exact(&entry.composition, &self.exact_values[id])
    }

    /// Composition projection of a hull point (drops the value axis).
    pub fn composition<'p>(&self, point: &'p HullPoint) -> &'p [Scalar] {
        point.composition()
    }

    /// Formation value per atom of an entry, relative to the chemical potentials.
    pub fn formation_value(&self, id: EntryId) -> Option<f64> {
        self.hull_point(id).map(|p| exact::to_f64(p.value()))
    }

    /// Position of `composition` on the regular simplex spanned by the endpoints.
    pub fn simplex_coordinates(&self, composition: &Composition) -> Option<DVector<f64>> {
        let total = composition.num_atoms();
        if total == 0 || composition.species().any(|s| self.endpoint_index(s).is_none()) {
            return None;
        }
        let mut v = DVector::zeros(self.dims() - 1);
        for e in &self.endpoints {
            let n = composition.count(&e.label);
            if n != 0 {
                v += &e.simplex * (n as f64 / total as f64);
            }
        }
        Some(v)
    }

    pub fn is_stable(&self, id: EntryId) -> Option<bool> {
        let hull = self.hull()?;
        let point = hull.point(id)?;
        Some(hull.is_vertex(point))
    }

    pub fn is_point_stable(&self, point: &HullPoint) -> Option<bool> {
        let hull = self.hull()?;
        if point.dims() != hull.dims() {
            return None;
        }
        Some(hull.is_vertex(point))
    }

    /// Vertical distance from an entry to the lower hull. Never negative.
    pub fn distance_to_hull(&self, id: EntryId) -> Option<f64> {
        let hull = self.hull()?;
        let d = hull.distance(hull.point(id)?)?;
        debug_assert!(!num_traits::Signed::is_negative(&d), "entry {} lies below its own hull", id);
        Some(exact::to_f64(&d))
    }

    /// Vertical distance from any structure to the current hull.
    ///
    /// Negative when the structure lies below the hull, i.e. it would become a
    /// new stable vertex if added.
    pub fn distance_to_hull_of<C: HullCandidate + ?Sized>(&self, structure: &C) -> Option<f64> {
        if structure.num_atoms() == 0 {
            return None;
        }
        let value = structure.property(&self.convex_property)?;
        let point = self.embed(&structure.composition(), value)?;
        self.distance_to_hull_point(&point)
    }

    pub fn distance_to_hull_point(&self, point: &HullPoint) -> Option<f64> {
        let hull = self.hull()?;
        let d = hull.distance(point)?;
        if num_traits::Signed::is_negative(&d) {
            warn!("Point lies {:.6} below the convex hull", -exact::to_f64(&d));
        }
        Some(exact::to_f64(&d))
    }

    /// Ids of the entries that are vertices of the lower hull.
    pub fn stable_entries(&self) -> Vec<EntryId> {
        let Some(hull) = self.hull() else {
            return Vec::new();
        };
        (0..self.entries.len())
            .filter(|&id| hull.point(id).map(|p| hull.is_vertex(p)).unwrap_or(false))
            .collect()
    }
}

/// Regular simplex with unit edges: vertex 0 at the origin, vertex 1 on the
/// first axis, and each further vertex raised into a new dimension above the
/// centroid of the previous ones.
fn simplex_vertices(count: usize) -> Vec<DVector<f64>> {
    let dims = count - 1;
    let mut vertices = vec![DVector::<f64>::zeros(dims); count];
    vertices[1][0] = 1.0;

    let mut sum = vertices[1].clone();
    for i in 2..count {
        let mut v = DVector::<f64>::zeros(dims);
        let mut height_sq: f64 = 1.0;
        for j in 0..(i - 1) {
            v[j] = sum[j] / i as f64;
            height_sq -= v[j] * v[j];
        }
        v[i - 1] = height_sq.sqrt();
        sum += &v;
        vertices[i] = v;
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simplex_edges_have_unit_length() {
        for n in 2..=6 {
            let v = simplex_vertices(n);
            for i in 0..n {
                for j in (i + 1)..n {
                    let d = (&v[i] - &v[j]).norm();
                    assert!((d - 1.0).abs() < 1e-12, "edge {}-{} of {}-simplex has length {}", i, j, n, d);
                }
            }
        }
    }

    #[test]
    fn first_two_vertices_are_pinned() {
        let v = simplex_vertices(4);
        assert_eq!(v[0], DVector::zeros(3));
        assert_eq!(v[1], DVector::from_vec(vec![1.0, 0.0, 0.0]));
    }
}
