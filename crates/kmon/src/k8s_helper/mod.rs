//! Small builders for the core/v1 objects kmon sends to the cluster.

pub mod container;
pub mod metadata;
pub mod resources;
pub mod volume;
