mod engine;

pub use engine::{EngineDependencies, PartitionEngine};
