pub mod graph;
pub mod matrix;
pub mod shortest_path;

pub use graph::LocationGraph;
pub use matrix::ShortestPathTable;
pub use shortest_path::{Path, ShortestPaths};
