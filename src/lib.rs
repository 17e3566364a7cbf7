//! Convex-hull stability analysis and atom separation for crystal structure prediction.

pub mod analysis;
pub mod build_cell;
pub mod config;
pub mod core;
pub mod error;
pub mod interface;
