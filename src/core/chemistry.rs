use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::domain::Species;
use crate::error::FormulaError;

/// Species label -> atom count. Counts are non-negative; zero entries are kept
/// so callers can tell "declared but absent" from "never mentioned".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Composition(BTreeMap<String, u32>);

impl Composition {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds atoms of `species`. Counts saturate at `u32::MAX`.
    pub fn add(&mut self, species: &str, count: u32) {
        let n = self.0.entry(species.to_string()).or_insert(0);
        *n = n.saturating_add(count);
    }

    /// Adds atoms of `species`, failing if the total atom count would no longer fit in a `u32`.
    pub fn checked_add(&mut self, species: &str, count: u32) -> Result<(), FormulaError> {
        let overflow = || FormulaError::CountOverflow {
            species: species.to_string(),
        };
        self.num_atoms().checked_add(count).ok_or_else(overflow)?;
        let n = self.0.entry(species.to_string()).or_insert(0);
        *n = n.checked_add(count).ok_or_else(overflow)?;
        Ok(())
    }

    pub fn count(&self, species: &str) -> u32 {
        self.0.get(species).copied().unwrap_or(0)
    }

    /// Total atom count, saturating at `u32::MAX`.
    pub fn num_atoms(&self) -> u32 {
        self.0.values().fold(0u32, |acc, &n| acc.saturating_add(n))
    }

    pub fn is_empty(&self) -> bool {
        self.num_atoms() == 0
    }

    /// Species with a non-zero count, in label order.
    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, &n)| n != 0)
            .map(|(s, _)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(s, &n)| (s.as_str(), n))
    }

    /// The species of a pure composition, i.e. exactly one non-zero count.
    pub fn single_species(&self) -> Option<&str> {
        let mut present = self.species();
        let first = present.next()?;
        match present.next() {
            None => Some(first),
            Some(_) => None,
        }
    }
}

impl<'a> FromIterator<(&'a str, u32)> for Composition {
    fn from_iter<I: IntoIterator<Item = (&'a str, u32)>>(iter: I) -> Self {
        let mut c = Composition::new();
        for (s, n) in iter {
            c.add(s, n);
        }
        c
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (species, count) in self.iter().filter(|(_, n)| *n != 0) {
            if count == 1 {
                write!(f, "{}", species)?;
            } else {
                write!(f, "{}{}", species, count)?;
            }
        }
        Ok(())
    }
}

fn formula_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z][a-z]*)(\d*)").expect("static formula regex"))
}

impl FromStr for Composition {
    type Err = FormulaError;

    /// Parses formulas like `Mg`, `MgO2` or `Al2Mg`. A missing count means 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FormulaError::Empty);
        }

        let mut composition = Composition::new();
        let mut cursor = 0;
        for caps in formula_regex().captures_iter(s) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((cursor, cursor));
            if whole.0 != cursor {
                return Err(FormulaError::UnexpectedToken(s[cursor..whole.0].to_string()));
            }
            cursor = whole.1;

            let species = &caps[1];
            let count = match &caps[2] {
                "" => 1,
                digits => digits.parse::<u32>().map_err(|_| FormulaError::CountOverflow {
                    species: species.to_string(),
                })?,
            };
            composition.checked_add(species, count)?;
        }

        if cursor != s.len() {
            return Err(FormulaError::UnexpectedToken(s[cursor..].to_string()));
        }
        Ok(composition)
    }
}

/// Species properties plus the table of minimum pair separations.
///
/// Replaces a process-wide species registry: build one and hand it to the
/// code that needs it.
#[derive(Debug, Clone, Default)]
pub struct SpeciesDatabase {
    species: Vec<Species>,
    /// Multiplier applied to covalent radius sums when no explicit pair distance exists.
    covalent_scale: f64,
    /// Keyed by the (min, max) ordered symbol pair.
    pair_distances: BTreeMap<(String, String), f64>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl SpeciesDatabase {
    /// `covalent_scale`: multiplier for radius-based separations (usually ~0.7-0.8).
    pub fn new(species: &[Species], covalent_scale: f64) -> Self {
        Self {
            species: species.to_vec(),
            covalent_scale,
            pair_distances: BTreeMap::new(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&Species> {
        self.species.iter().find(|s| s.symbol == symbol)
    }

    pub fn radius(&self, symbol: &str) -> Option<f64> {
        self.get(symbol).map(|s| s.radius_covalent)
    }

    /// Sets an explicit separation for the unordered pair, overriding radii.
    pub fn set_pair_distance(&mut self, a: &str, b: &str, distance: f64) {
        self.pair_distances.insert(pair_key(a, b), distance);
    }

    /// Minimum allowed separation for an unordered species pair.
    /// Explicit entries win; otherwise `(r_a + r_b) * covalent_scale` when both radii are known.
    pub fn pair_distance(&self, a: &str, b: &str) -> Option<f64> {
        if let Some(&d) = self.pair_distances.get(&pair_key(a, b)) {
            return Some(d);
        }
        let r_a = self.radius(a)?;
        let r_b = self.radius(b)?;
        Some((r_a + r_b) * self.covalent_scale)
    }

    /// Squared pair distance, 0 when the pair is unconstrained.
    #[inline]
    pub fn collision_sq(&self, a: &str, b: &str) -> f64 {
        self.pair_distance(a, b).map(|d| d * d).unwrap_or(0.0)
    }
}
