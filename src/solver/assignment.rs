use std::cmp::Reverse;
use std::collections::BTreeSet;

use chrono::TimeDelta;
use tracing::{debug, info, warn};

use crate::config::RoutingConfig;
use crate::domain::directive::Directive;
use crate::domain::shipment::ShipmentRegistry;
use crate::domain::types::{ShipmentId, ShipmentStatus, VehicleId};
use crate::domain::vehicle::Fleet;
use crate::error::RoutingError;

/// Vehicles singled out while assigning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOutcome {
    /// Earliest-departing staffed vehicle; carries co-delivery groups.
    pub primary: VehicleId,
    /// Staffed vehicle whose departure waits for late-arriving shipments.
    pub late_carrier: Option<VehicleId>,
}

/// Commits every shipment to exactly one vehicle before any route is built.
///
/// Rules run in a fixed order and never revisit earlier commitments:
/// vehicle restrictions, late arrivals, wrong addresses, co-delivery groups,
/// destination co-location, deadline shipments, then everything else.
pub struct AssignmentEngine<'a> {
    config: &'a RoutingConfig,
}

impl<'a> AssignmentEngine<'a> {
    pub fn new(config: &'a RoutingConfig) -> Self {
        AssignmentEngine { config }
    }

    pub fn assign(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<AssignmentOutcome, RoutingError> {
        let primary = *fleet
            .staffed()
            .first()
            .ok_or_else(|| RoutingError::InvalidConfig("no staffed vehicle".into()))?;

        self.pin_restricted(registry, fleet)?;
        let late_carrier = self.hold_late_arrivals(registry, fleet, primary)?;
        self.hold_wrong_addresses(registry, fleet)?;
        let primary = *fleet.staffed().first().unwrap_or(&primary);
        self.pin_groups(registry, fleet, primary)?;
        self.pin_colocated(registry, fleet)?;
        self.place_deadlines(registry, fleet)?;
        self.place_remaining(registry, fleet)?;

        verify(registry, fleet)?;
        for vehicle in fleet.iter() {
            info!(
                "Vehicle #{} committed {} shipment(s), {} slot(s) left",
                vehicle.id,
                vehicle.committed.len(),
                vehicle.available()
            );
        }
        Ok(AssignmentOutcome { primary, late_carrier })
    }

    fn pin_restricted(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<(), RoutingError> {
        for id in registry.ids() {
            if let Some(Directive::VehicleRestricted(vehicle)) = registry.get(id)?.directive {
                pin(registry, fleet, id, vehicle, true)?;
            }
        }
        Ok(())
    }

    fn hold_late_arrivals(
        &self,
        registry: &mut ShipmentRegistry,
        fleet: &mut Fleet,
        primary: VehicleId,
    ) -> Result<Option<VehicleId>, RoutingError> {
        let mut carrier: Option<VehicleId> = None;

        for id in registry.ids() {
            let Some(Directive::LateArrival(ready)) = registry.get(id)?.directive else {
                continue;
            };
            {
                let shipment = registry.get_mut(id)?;
                shipment.set_status(ShipmentStatus::Delayed, TimeDelta::zero())?;
                shipment.ready_time = Some(ready);
            }

            let vehicle_id = match carrier {
                Some(vehicle_id) => vehicle_id,
                None => {
                    let staffed = fleet.staffed();
                    let chosen = staffed
                        .iter()
                        .copied()
                        .find(|v| *v != primary)
                        .unwrap_or(primary);
                    info!("Vehicle #{} designated to carry late-arriving shipments", chosen);
                    carrier = Some(chosen);
                    chosen
                }
            };

            let vehicle = fleet.get_mut(vehicle_id)?;
            if vehicle.departure < ready {
                debug!("Vehicle #{} departure pushed to {:?}", vehicle_id, ready);
                vehicle.departure = ready;
            }
            pin(registry, fleet, id, vehicle_id, true)?;
        }
        Ok(carrier)
    }

    fn hold_wrong_addresses(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<(), RoutingError> {
        for id in registry.ids() {
            if registry.get(id)?.directive != Some(Directive::WrongAddress) {
                continue;
            }
            {
                let shipment = registry.get_mut(id)?;
                shipment.wrong_address = true;
                shipment.ready_time = Some(self.config.correction_time);
            }
            // Unknown destination: park it on a vehicle that leaves late anyway
            let vehicle_id = match fleet.iter().find(|v| v.operator.is_none()) {
                Some(vehicle) => vehicle.id,
                None => {
                    warn!("No unstaffed vehicle for shipment #{} with a wrong address", id);
                    fleet.len()
                }
            };
            pin(registry, fleet, id, vehicle_id, true)?;
        }
        Ok(())
    }

    fn pin_groups(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet, primary: VehicleId) -> Result<(), RoutingError> {
        let mut groups: Vec<BTreeSet<ShipmentId>> = vec![];
        for shipment in registry.iter() {
            if let Some(Directive::MustShipWith(others)) = &shipment.directive {
                let mut group: BTreeSet<ShipmentId> = others.iter().copied().collect();
                group.insert(shipment.id);
                groups.push(group);
            }
        }

        for group in merge_overlapping(groups) {
            let mut members: BTreeSet<ShipmentId> = BTreeSet::new();
            let mut pinned: Option<VehicleId> = None;
            for id in &group {
                let shipment = registry.get(*id)?;
                if let Some(vehicle) = shipment.vehicle {
                    match pinned {
                        Some(existing) if existing != vehicle => {
                            return Err(RoutingError::GroupConflict {
                                shipment: *id,
                                first: existing,
                                second: vehicle,
                            })
                        }
                        _ => pinned = Some(vehicle),
                    }
                }
                members.extend(registry.unassigned_at_destination(*id)?);
            }

            let members: Vec<ShipmentId> = members.into_iter().collect();
            let vehicle_id = pinned.unwrap_or(primary);
            ensure_room(registry, fleet, vehicle_id, &members)?;
            debug!("Co-delivery group {:?} pinned to vehicle #{}", members, vehicle_id);
            for id in members {
                pin(registry, fleet, id, vehicle_id, true)?;
            }
        }
        Ok(())
    }

    /// Shipments sharing a stop with an already pinned shipment ride along.
    fn pin_colocated(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<(), RoutingError> {
        let pinned: Vec<(VehicleId, ShipmentId)> = fleet
            .iter()
            .flat_map(|v| v.committed.iter().map(move |id| (v.id, *id)))
            .collect();

        for (vehicle_id, id) in pinned {
            let members = registry.unassigned_at_destination(id)?;
            if members.is_empty() {
                continue;
            }
            ensure_room(registry, fleet, vehicle_id, &members)?;
            for member in members {
                pin(registry, fleet, member, vehicle_id, true)?;
            }
        }
        Ok(())
    }

    fn place_deadlines(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<(), RoutingError> {
        let pending: Vec<ShipmentId> = registry
            .iter()
            .filter(|s| s.deadline.is_some() && s.vehicle.is_none())
            .map(|s| s.id)
            .collect();

        for id in pending {
            let members = registry.unassigned_at_destination(id)?;
            if members.is_empty() {
                continue;
            }

            let staffed = fleet.staffed();
            let unstaffed = fleet.iter().filter(|v| v.operator.is_none()).map(|v| v.id);
            let candidates: Vec<VehicleId> = staffed.iter().copied().chain(unstaffed).collect();
            let vehicle_id = candidates
                .into_iter()
                .find(|v| fleet.get(*v).is_ok_and(|v| v.available() >= members.len()))
                .ok_or_else(|| capacity_error(&*registry, id, members.len()))?;

            if !staffed.contains(&vehicle_id) {
                warn!("Deadline shipment #{} assigned to unstaffed vehicle #{}", id, vehicle_id);
            }
            for member in members {
                pin(registry, fleet, member, vehicle_id, false)?;
            }
        }
        Ok(())
    }

    fn place_remaining(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<(), RoutingError> {
        for id in registry.ids() {
            let members = registry.unassigned_at_destination(id)?;
            if members.is_empty() {
                continue;
            }
            // a destination's shipments are never split across vehicles
            let vehicle_id = fleet
                .iter()
                .filter(|v| v.available() >= members.len())
                .max_by_key(|v| (v.available(), Reverse(v.id)))
                .map(|v| v.id)
                .ok_or_else(|| capacity_error(&*registry, id, members.len()))?;
            for member in members {
                pin(registry, fleet, member, vehicle_id, false)?;
            }
        }
        Ok(())
    }
}

fn pin(
    registry: &mut ShipmentRegistry,
    fleet: &mut Fleet,
    id: ShipmentId,
    vehicle_id: VehicleId,
    reserve: bool,
) -> Result<(), RoutingError> {
    let shipment = registry.get_mut(id)?;
    match shipment.vehicle {
        Some(current) if current == vehicle_id => return Ok(()),
        Some(current) => {
            return Err(RoutingError::AlreadyAssigned {
                shipment: id,
                vehicle: current,
            })
        }
        None => {}
    }
    fleet.get_mut(vehicle_id)?.commit(id, &shipment.destination)?;
    shipment.vehicle = Some(vehicle_id);
    shipment.space_reserved |= reserve;
    debug!("Shipment #{} -> vehicle #{}", id, vehicle_id);
    Ok(())
}

fn ensure_room(
    registry: &ShipmentRegistry,
    fleet: &Fleet,
    vehicle_id: VehicleId,
    members: &[ShipmentId],
) -> Result<(), RoutingError> {
    let needed = members
        .iter()
        .filter(|id| registry.get(**id).is_ok_and(|s| s.vehicle.is_none()))
        .count();
    if fleet.get(vehicle_id)?.available() < needed {
        let first = members.first().copied().unwrap_or_default();
        return Err(capacity_error(registry, first, needed));
    }
    Ok(())
}

fn capacity_error(registry: &ShipmentRegistry, id: ShipmentId, count: usize) -> RoutingError {
    let destination = registry
        .get(id)
        .map(|s| s.destination.clone())
        .unwrap_or_default();
    RoutingError::CapacityExhausted { destination, count }
}

fn merge_overlapping(groups: Vec<BTreeSet<ShipmentId>>) -> Vec<BTreeSet<ShipmentId>> {
    let mut merged: Vec<BTreeSet<ShipmentId>> = vec![];
    for group in groups {
        let (overlapping, mut rest): (Vec<_>, Vec<_>) =
            merged.into_iter().partition(|existing| !existing.is_disjoint(&group));
        let mut combined = group;
        for existing in overlapping {
            combined.extend(existing);
        }
        rest.push(combined);
        merged = rest;
    }
    merged.sort();
    merged
}

/// Every shipment on exactly one vehicle, no vehicle over capacity.
fn verify(registry: &ShipmentRegistry, fleet: &Fleet) -> Result<(), RoutingError> {
    for shipment in registry.iter() {
        let Some(vehicle_id) = shipment.vehicle else {
            return Err(capacity_error(registry, shipment.id, 1));
        };
        let holders = fleet
            .iter()
            .filter(|v| v.committed.contains(&shipment.id))
            .count();
        if holders != 1 || !fleet.get(vehicle_id)?.committed.contains(&shipment.id) {
            return Err(RoutingError::AlreadyAssigned {
                shipment: shipment.id,
                vehicle: vehicle_id,
            });
        }
    }
    for vehicle in fleet.iter() {
        if vehicle.committed.len() + vehicle.loaded_count() > vehicle.capacity {
            return Err(RoutingError::CapacityExhausted {
                destination: format!("vehicle #{}", vehicle.id),
                count: vehicle.committed.len(),
            });
        }
    }
    Ok(())
}
