pub mod assignment;
pub mod dispatch;
pub mod report;
pub mod route_builder;
pub mod simulator;

pub use assignment::*;
pub use route_builder::*;
pub use simulator::*;
