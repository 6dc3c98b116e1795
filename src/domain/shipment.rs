use std::collections::BTreeMap;

use chrono::TimeDelta;

use crate::domain::directive::Directive;
use crate::domain::types::{ShipmentId, ShipmentStatus, VehicleId};
use crate::error::RoutingError;

#[derive(Debug, Clone)]
pub struct Shipment {
    pub id: ShipmentId,
    pub destination: String,
    /// `None` means end of day.
    pub deadline: Option<TimeDelta>,
    pub mass: f64,
    pub note: String,
    pub directive: Option<Directive>,
    pub vehicle: Option<VehicleId>,
    pub status: ShipmentStatus,
    pub history: Vec<(TimeDelta, ShipmentStatus)>,
    pub wrong_address: bool,
    pub space_reserved: bool,
    /// Earliest time the shipment can leave the depot (late arrivals, address corrections).
    pub ready_time: Option<TimeDelta>,
}

impl Shipment {
    pub fn new(id: ShipmentId, destination: &str, deadline: Option<TimeDelta>, mass: f64) -> Self {
        Shipment {
            id,
            destination: destination.trim().to_string(),
            deadline,
            mass,
            note: String::new(),
            directive: None,
            vehicle: None,
            status: ShipmentStatus::AtDepot,
            history: vec![(TimeDelta::zero(), ShipmentStatus::AtDepot)],
            wrong_address: false,
            space_reserved: false,
            ready_time: None,
        }
    }

    pub fn with_directive(mut self, note: &str, directive: Option<Directive>) -> Self {
        self.note = note.trim().to_string();
        self.directive = directive;
        self
    }

    pub fn is_delivered(&self) -> bool {
        self.status == ShipmentStatus::Delivered
    }

    /// Records a status change. Delivering twice is an invariant violation.
    pub fn set_status(&mut self, status: ShipmentStatus, time: TimeDelta) -> Result<(), RoutingError> {
        if self.is_delivered() {
            return Err(RoutingError::AlreadyDelivered(self.id));
        }
        // A status set at the very start replaces the opening entry
        let opening_only = self.history.len() == 1;
        match self.history.last_mut() {
            Some(last) if opening_only && last.0 == time => *last = (time, status),
            _ => self.history.push((time, status)),
        }
        self.status = status;
        Ok(())
    }

    /// Status as it was at `time`.
    pub fn status_at(&self, time: TimeDelta) -> ShipmentStatus {
        self.history
            .iter()
            .take_while(|(at, _)| *at <= time)
            .last()
            .map(|(_, status)| *status)
            .unwrap_or(ShipmentStatus::AtDepot)
    }

    pub fn delivered_at(&self) -> Option<TimeDelta> {
        self.history
            .iter()
            .find(|(_, status)| *status == ShipmentStatus::Delivered)
            .map(|(at, _)| *at)
    }
}

/// Shipments keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ShipmentRegistry {
    shipments: BTreeMap<ShipmentId, Shipment>,
}

impl ShipmentRegistry {
    pub fn new(shipments: Vec<Shipment>) -> Self {
        ShipmentRegistry {
            shipments: shipments.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    pub fn get(&self, id: ShipmentId) -> Result<&Shipment, RoutingError> {
        self.shipments.get(&id).ok_or(RoutingError::UnknownShipment(id))
    }

    pub fn get_mut(&mut self, id: ShipmentId) -> Result<&mut Shipment, RoutingError> {
        self.shipments
            .get_mut(&id)
            .ok_or(RoutingError::UnknownShipment(id))
    }

    pub fn ids(&self) -> Vec<ShipmentId> {
        self.shipments.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shipment> {
        self.shipments.values()
    }

    /// Unassigned shipments sharing `id`'s destination, `id` included.
    pub fn unassigned_at_destination(&self, id: ShipmentId) -> Result<Vec<ShipmentId>, RoutingError> {
        let shipment = self.get(id)?;
        if shipment.wrong_address {
            return Ok(if shipment.vehicle.is_none() { vec![id] } else { vec![] });
        }
        Ok(self
            .iter()
            .filter(|s| !s.wrong_address && s.vehicle.is_none() && s.destination == shipment.destination)
            .map(|s| s.id)
            .collect())
    }
}
