pub mod action;
pub mod check;
pub mod compile;
pub mod error;
pub mod event;
pub mod group;
pub mod memory;
pub mod metadata;
pub mod policy;
pub mod registry;
pub mod repo;
pub mod runner;
pub mod state;

pub use error::{ConfigError, PolicyError, Result};
pub use policy::Policy;
