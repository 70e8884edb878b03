//! Builders to assemble pools from configuration and custom policies.

pub mod pool_builder;

pub use pool_builder::PoolBuilder;
