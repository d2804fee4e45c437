pub mod cube;
pub mod mirror;
