pub mod chemistry;
pub mod domain;
pub mod spatial;
