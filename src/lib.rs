pub mod config;
pub mod distance;
pub mod domain;
pub mod error;
pub mod fixtures;
pub mod setup;
pub mod solver;
pub mod utils;

pub use error::{ErrorKind, RoutingError};
