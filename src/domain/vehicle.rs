use std::collections::VecDeque;

use chrono::TimeDelta;

use crate::domain::types::{Leg, OperatorId, ShipmentId, StopBundle, VehicleId, VehiclePhase, Visit};
use crate::error::RoutingError;

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub capacity: usize,
    pub operator: Option<OperatorId>,
    pub location: String,
    pub time: TimeDelta,
    pub departure: TimeDelta,
    pub mileage: f64,
    /// Assigned shipments not yet sequenced into a stop bundle.
    pub committed: Vec<ShipmentId>,
    pub queue: VecDeque<StopBundle>,
    pub delivered: Vec<ShipmentId>,
    pub history: Vec<Visit>,
    pub phase: VehiclePhase,
}

impl Vehicle {
    pub fn new(id: VehicleId, capacity: usize, operator: Option<OperatorId>, depot: &str, start: TimeDelta) -> Self {
        Vehicle {
            id,
            capacity,
            operator,
            location: depot.to_string(),
            time: start,
            departure: start,
            mileage: 0.0,
            committed: vec![],
            queue: VecDeque::new(),
            delivered: vec![],
            history: vec![Visit {
                location: depot.to_string(),
                time: start,
                distance: 0.0,
            }],
            phase: VehiclePhase::AtDepot(start),
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.queue.iter().map(|bundle| bundle.shipments.len()).sum()
    }

    /// Room left once committed and loaded shipments are counted.
    pub fn available(&self) -> usize {
        self.capacity
            .saturating_sub(self.committed.len() + self.loaded_count())
    }

    pub fn commit(&mut self, shipment: ShipmentId, destination: &str) -> Result<(), RoutingError> {
        if self.available() == 0 {
            return Err(RoutingError::CapacityExhausted {
                destination: destination.to_string(),
                count: 1,
            });
        }
        self.committed.push(shipment);
        Ok(())
    }

    pub fn uncommit(&mut self, shipment: ShipmentId) -> bool {
        let before = self.committed.len();
        self.committed.retain(|id| *id != shipment);
        before != self.committed.len()
    }

    /// Location of the last sequenced stop with a known address.
    pub fn last_stop(&self) -> Option<&str> {
        self.queue
            .iter()
            .rev()
            .find(|bundle| matches!(bundle.leg, Leg::Known(_)))
            .map(|bundle| bundle.location.as_str())
    }

    pub fn has_pending_work(&self) -> bool {
        !self.committed.is_empty() || !self.queue.is_empty()
    }

    /// Moves the vehicle to `location`, arriving at `time` after `distance` more units.
    pub fn arrive(&mut self, location: &str, time: TimeDelta, distance: f64) {
        self.mileage += distance;
        self.time = time;
        self.location = location.to_string();
        self.history.push(Visit {
            location: location.to_string(),
            time,
            distance: self.mileage,
        });
        self.phase = VehiclePhase::AtStop {
            time,
            location: location.to_string(),
        };
    }

    /// Stays at the current location until `time`; the wait is kept in the history.
    pub fn wait_until(&mut self, time: TimeDelta) {
        if time <= self.time {
            return;
        }
        self.time = time;
        self.history.push(Visit {
            location: self.location.clone(),
            time,
            distance: self.mileage,
        });
        self.phase = VehiclePhase::AtStop {
            time,
            location: self.location.clone(),
        };
    }

    /// Last recorded position at `time` and whether the vehicle was between stops.
    pub fn position_at(&self, time: TimeDelta) -> Option<(&Visit, bool)> {
        let index = self.history.iter().rposition(|visit| visit.time <= time)?;
        let current = &self.history[index];
        let in_transit = time >= self.departure
            && self
                .history
                .get(index + 1)
                .is_some_and(|next| next.location != current.location);
        Some((current, in_transit))
    }
}

#[derive(Debug, Clone)]
pub struct Fleet {
    vehicles: Vec<Vehicle>,
}

impl Fleet {
    /// Vehicles are numbered from 1; the first `operators` of them start staffed.
    pub fn new(count: usize, operators: usize, capacity: usize, depot: &str, start: TimeDelta) -> Self {
        let vehicles = (1..=count)
            .map(|id| {
                let operator = if id <= operators { Some(id) } else { None };
                Vehicle::new(id, capacity, operator, depot, start)
            })
            .collect();
        Fleet { vehicles }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn get(&self, id: VehicleId) -> Result<&Vehicle, RoutingError> {
        id.checked_sub(1)
            .and_then(|index| self.vehicles.get(index))
            .ok_or(RoutingError::UnknownVehicle(id))
    }

    pub fn get_mut(&mut self, id: VehicleId) -> Result<&mut Vehicle, RoutingError> {
        id.checked_sub(1)
            .and_then(|index| self.vehicles.get_mut(index))
            .ok_or(RoutingError::UnknownVehicle(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.iter()
    }

    /// Staffed vehicles ordered by departure, then id.
    pub fn staffed(&self) -> Vec<VehicleId> {
        let mut ids: Vec<&Vehicle> = self.vehicles.iter().filter(|v| v.operator.is_some()).collect();
        ids.sort_by_key(|v| (v.departure, v.id));
        ids.into_iter().map(|v| v.id).collect()
    }

    /// Unstaffed vehicles still holding work, lowest id first.
    pub fn waiting(&self) -> Vec<VehicleId> {
        self.vehicles
            .iter()
            .filter(|v| v.operator.is_none() && v.has_pending_work())
            .map(|v| v.id)
            .collect()
    }

    pub fn total_mileage(&self) -> f64 {
        self.vehicles.iter().map(|v| v.mileage).sum()
    }
}
