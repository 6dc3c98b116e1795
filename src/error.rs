use thiserror::Error;

use crate::domain::types::{ShipmentId, VehicleId};

/// Broad class of a failure; none of them are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Scheduling,
    State,
}

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Unknown location: {0}")]
    UnknownLocation(String),
    #[error("Malformed directive \"{note}\": {reason}")]
    MalformedDirective { note: String, reason: String },
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unknown vehicle #{0}")]
    UnknownVehicle(VehicleId),
    #[error("Unknown shipment #{0}")]
    UnknownShipment(ShipmentId),
    #[error("No vehicle has room for {count} shipment(s) bound for {destination}")]
    CapacityExhausted { destination: String, count: usize },
    #[error("Deadline {deadline} at {destination} missed: arrival at {arrival}")]
    DeadlineMissed {
        destination: String,
        deadline: String,
        arrival: String,
    },
    #[error("Co-delivery group of shipment #{shipment} is pinned to vehicles #{first} and #{second}")]
    GroupConflict {
        shipment: ShipmentId,
        first: VehicleId,
        second: VehicleId,
    },
    #[error("Shipment #{shipment} is already assigned to vehicle #{vehicle}")]
    AlreadyAssigned {
        shipment: ShipmentId,
        vehicle: VehicleId,
    },
    #[error("Shipment #{0} was already delivered")]
    AlreadyDelivered(ShipmentId),
    #[error("Shipment #{0} was never delivered")]
    Undelivered(ShipmentId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RoutingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoutingError::CapacityExhausted { .. }
            | RoutingError::DeadlineMissed { .. }
            | RoutingError::GroupConflict { .. } => ErrorKind::Scheduling,
            RoutingError::AlreadyAssigned { .. }
            | RoutingError::AlreadyDelivered(_)
            | RoutingError::Undelivered(_) => ErrorKind::State,
            _ => ErrorKind::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_classified() {
        assert_eq!(
            RoutingError::UnknownLocation("X".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            RoutingError::CapacityExhausted {
                destination: "X".into(),
                count: 2
            }
            .kind(),
            ErrorKind::Scheduling
        );
        assert_eq!(RoutingError::AlreadyDelivered(4).kind(), ErrorKind::State);
    }
}
