pub mod point_separator;
pub mod random;
