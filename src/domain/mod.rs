pub mod directive;
pub mod shipment;
pub mod types;
pub mod vehicle;

pub use directive::{Directive, DirectiveKind, DirectiveParser};
pub use shipment::{Shipment, ShipmentRegistry};
pub use types::*;
pub use vehicle::{Fleet, Vehicle};
