pub mod convex_hull;
pub mod exact;
pub mod hull;
pub mod simplex;
pub mod stability;
