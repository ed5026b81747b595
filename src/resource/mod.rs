pub mod factory;

pub use factory::{MetadataCache, Resource, ResourceFactory};
