use thiserror::Error;

/// Precondition violations raised while building or feeding a convex hull.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HullError {
    #[error("need at least two endpoints to make a convex hull, got {0}")]
    TooFewEndpoints(usize),

    #[error("endpoint '{0}' was declared more than once")]
    DuplicateEndpoint(String),

    #[error("endpoint '{0}' is not a single species")]
    CompoundEndpoint(String),

    #[error("species '{species}' is not one of the hull endpoints")]
    ForeignSpecies { species: String },

    #[error("hull value {0} is not a finite number")]
    NonFiniteValue(f64),
}

/// Malformed chemical formula strings (e.g. "Mg2O").
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("empty formula")]
    Empty,

    #[error("unexpected text '{0}' in formula")]
    UnexpectedToken(String),

    #[error("count for '{species}' is out of range")]
    CountOverflow { species: String },
}

/// Failures of the random structure builder.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("box size must be positive, got {0}")]
    InvalidBoxSize(f64),

    #[error("unknown species '{0}' requested")]
    UnknownSpecies(String),

    #[error("atoms could not be separated within {max_iterations} iterations")]
    SeparationFailed { max_iterations: usize },
}
