use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

/// Exact number type used by the hull kernel.
pub type Scalar = BigRational;

/// A point in hull space. Coordinate 0 is the value axis (formation value per
/// atom), the rest are composition coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HullPoint {
    coords: Vec<Scalar>,
}

impl HullPoint {
    pub fn new(value: Scalar, composition: Vec<Scalar>) -> Self {
        let mut coords = Vec::with_capacity(composition.len() + 1);
        coords.push(value);
        coords.extend(composition);
        Self { coords }
    }

    pub fn dims(&self) -> usize {
        self.coords.len()
    }

    pub fn value(&self) -> &Scalar {
        &self.coords[0]
    }

    pub fn composition(&self) -> &[Scalar] {
        &self.coords[1..]
    }
}

/// Exact rational image of a finite float. `None` for NaN and infinities.
pub fn from_f64(v: f64) -> Option<Scalar> {
    BigRational::from_float(v)
}

pub fn ratio(numer: u32, denom: u32) -> Scalar {
    BigRational::new(BigInt::from(numer), BigInt::from(denom))
}

pub fn from_count(n: u32) -> Scalar {
    BigRational::from_integer(BigInt::from(n))
}

/// Nearest float, tolerating numerators/denominators beyond the f64 range.
pub fn to_f64(r: &Scalar) -> f64 {
    if r.is_zero() {
        return 0.0;
    }
    let mut numer = r.numer().clone();
    let mut denom = r.denom().clone();

    // Keep both parts representable before dividing.
    let excess = numer.bits().max(denom.bits()).saturating_sub(1000);
    if excess > 0 {
        numer >>= excess as usize;
        denom >>= excess as usize;
        if denom.is_zero() {
            return if r > &BigRational::zero() { f64::INFINITY } else { f64::NEG_INFINITY };
        }
    }

    match (numer.to_f64(), denom.to_f64()) {
        (Some(n), Some(d)) => n / d,
        _ => f64::NAN,
    }
}
