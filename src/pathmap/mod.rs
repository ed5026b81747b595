pub mod disambiguate;
pub mod engine;
pub mod normalize;
pub mod tree;

pub use engine::{DirEntry, PathMapError, PathMappingEngine};
