use std::fmt;

use chrono::TimeDelta;
use serde::Serialize;

pub type ShipmentId = u32;
pub type VehicleId = usize;
pub type OperatorId = usize;

/// A physical stop. The address doubles as the graph key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub address: String,
    pub zip_code: String,
}

impl Location {
    pub fn new(address: &str, zip_code: &str) -> Self {
        Location {
            address: address.trim().to_string(),
            zip_code: zip_code.trim().to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.zip_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ShipmentStatus {
    AtDepot,
    Delayed,
    InTransit,
    Delivered,
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShipmentStatus::AtDepot => "At the Hub",
            ShipmentStatus::Delayed => "At the Hub (Delayed)",
            ShipmentStatus::InTransit => "En Route",
            ShipmentStatus::Delivered => "Delivered",
        };
        f.write_str(label)
    }
}

/// Distance of the leg leading to a stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Leg {
    Known(f64),
    /// Destination unknown until its address is corrected.
    Pending,
}

/// Shipments dropped together at one location visit.
#[derive(Debug, Clone, PartialEq)]
pub struct StopBundle {
    pub location: String,
    pub shipments: Vec<ShipmentId>,
    pub leg: Leg,
}

/// Where a vehicle is in its day.
#[derive(Debug, Clone, PartialEq)]
pub enum VehiclePhase {
    AtDepot(TimeDelta),
    EnRoute { since: TimeDelta, next: String },
    AtStop { time: TimeDelta, location: String },
    ReturnedToDepot(TimeDelta),
}

/// One visited position: location, arrival time, cumulative distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub location: String,
    pub time: TimeDelta,
    pub distance: f64,
}
