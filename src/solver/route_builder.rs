use std::collections::BTreeMap;

use chrono::TimeDelta;
use tracing::{debug, info};

use crate::config::RoutingConfig;
use crate::distance::matrix::ShortestPathTable;
use crate::domain::shipment::ShipmentRegistry;
use crate::domain::types::{Leg, ShipmentId, StopBundle, VehicleId};
use crate::domain::vehicle::Fleet;
use crate::error::RoutingError;
use crate::utils::{format_clock, travel_time};

/// Stops still to be sequenced, keyed by destination.
struct OpenStop {
    shipments: Vec<ShipmentId>,
    /// Tightest deadline among the stop's shipments.
    deadline: Option<TimeDelta>,
    reserved: bool,
}

/// Turns a vehicle's committed shipments into an ordered queue of stop bundles.
///
/// Deadline stops are sequenced first by nearest neighbour, then the rest.
/// While sequencing the rest, a long detour to a single unreserved shipment may
/// be handed to the overflow vehicle instead.
pub struct RouteBuilder<'a> {
    table: &'a ShortestPathTable,
    config: &'a RoutingConfig,
}

impl<'a> RouteBuilder<'a> {
    pub fn new(table: &'a ShortestPathTable, config: &'a RoutingConfig) -> Self {
        RouteBuilder { table, config }
    }

    /// Sequences `vehicle_id`'s commitments starting at `start`; returns the planned finish time.
    pub fn build(
        &self,
        vehicle_id: VehicleId,
        registry: &mut ShipmentRegistry,
        fleet: &mut Fleet,
        start: TimeDelta,
        allow_eviction: bool,
    ) -> Result<TimeDelta, RoutingError> {
        let vehicle = fleet.get(vehicle_id)?;
        let staffed = vehicle.operator.is_some();
        let mut current = vehicle
            .last_stop()
            .unwrap_or(vehicle.location.as_str())
            .to_string();

        let mut urgent: BTreeMap<String, OpenStop> = BTreeMap::new();
        let mut relaxed: BTreeMap<String, OpenStop> = BTreeMap::new();
        let mut pending: Vec<StopBundle> = vec![];

        let mut open: BTreeMap<String, OpenStop> = BTreeMap::new();
        for id in &vehicle.committed {
            let shipment = registry.get(*id)?;
            if shipment.wrong_address {
                pending.push(StopBundle {
                    location: shipment.destination.clone(),
                    shipments: vec![*id],
                    leg: Leg::Pending,
                });
                continue;
            }
            let stop = open.entry(shipment.destination.clone()).or_insert(OpenStop {
                shipments: vec![],
                deadline: None,
                reserved: false,
            });
            stop.shipments.push(*id);
            stop.reserved |= shipment.space_reserved;
            stop.deadline = match (stop.deadline, shipment.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        for (destination, stop) in open {
            if stop.deadline.is_some() {
                urgent.insert(destination, stop);
            } else {
                relaxed.insert(destination, stop);
            }
        }

        let overflow = self.config.overflow_vehicle_id();
        let mut overflow_room = match fleet.get(overflow) {
            Ok(v) if v.operator.is_none() && v.queue.is_empty() => v.available(),
            _ => 0,
        };
        let can_evict = allow_eviction && staffed && vehicle_id != overflow;

        let mut route: Vec<StopBundle> = vec![];
        let mut evicted: Vec<ShipmentId> = vec![];
        let mut time = start;

        while let Some((destination, distance)) = self.nearest(&current, &urgent)? {
            let stop = urgent
                .remove(&destination)
                .ok_or_else(|| RoutingError::UnknownLocation(destination.clone()))?;
            let arrival = time + travel_time(distance, self.config.speed);
            if let Some(deadline) = stop.deadline {
                if arrival + self.config.deadline_leeway > deadline {
                    return Err(RoutingError::DeadlineMissed {
                        destination,
                        deadline: format_clock(deadline),
                        arrival: format_clock(arrival),
                    });
                }
            }
            debug!("Vehicle #{} plans {} at {}", vehicle_id, destination, format_clock(arrival));
            route.push(StopBundle {
                location: destination.clone(),
                shipments: stop.shipments,
                leg: Leg::Known(distance),
            });
            current = destination;
            time = arrival;
        }

        while let Some((destination, distance)) = self.nearest(&current, &relaxed)? {
            let stop = relaxed
                .remove(&destination)
                .ok_or_else(|| RoutingError::UnknownLocation(destination.clone()))?;

            if can_evict
                && distance >= self.config.detour_threshold
                && stop.shipments.len() == 1
                && !stop.reserved
                && overflow_room > 0
            {
                info!(
                    "Vehicle #{}: {:.1} to {} is a detour, handing it to vehicle #{}",
                    vehicle_id, distance, destination, overflow
                );
                evicted.extend(stop.shipments);
                overflow_room -= 1;
                continue;
            }

            time += travel_time(distance, self.config.speed);
            route.push(StopBundle {
                location: destination.clone(),
                shipments: stop.shipments,
                leg: Leg::Known(distance),
            });
            current = destination;
        }

        for id in evicted {
            fleet.get_mut(vehicle_id)?.uncommit(id);
            let shipment = registry.get_mut(id)?;
            fleet.get_mut(overflow)?.commit(id, &shipment.destination)?;
            shipment.vehicle = Some(overflow);
        }

        let vehicle = fleet.get_mut(vehicle_id)?;
        let sequenced: Vec<ShipmentId> = route
            .iter()
            .chain(pending.iter())
            .flat_map(|bundle| bundle.shipments.iter().copied())
            .collect();
        vehicle.committed.retain(|id| !sequenced.contains(id));
        vehicle.queue.extend(route);
        vehicle.queue.extend(pending);

        info!(
            "Vehicle #{} route: {} stop(s), planned finish {}",
            vehicle_id,
            vehicle.queue.len(),
            format_clock(time)
        );
        Ok(time)
    }

    fn nearest(&self, from: &str, stops: &BTreeMap<String, OpenStop>) -> Result<Option<(String, f64)>, RoutingError> {
        if stops.is_empty() {
            return Ok(None);
        }
        let paths = self.table.from(from)?;
        match paths.closest_unvisited(stops.keys().map(String::as_str)) {
            Some((destination, distance)) => Ok(Some((destination.to_string(), distance))),
            None => {
                let unreachable = stops.keys().next().cloned().unwrap_or_default();
                Err(RoutingError::UnknownLocation(unreachable))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::graph::LocationGraph;
    use crate::domain::shipment::Shipment;
    use crate::domain::types::Location;
    use crate::utils::clock;

    /// HUB-A 2, HUB-B 8, HUB-C 3, A-B 7, A-C 4, B-C 9.
    fn table() -> ShortestPathTable {
        let mut graph = LocationGraph::new();
        for address in ["HUB", "A", "B", "C"] {
            graph.add_location(Location::new(address, "84100"));
        }
        for (a, b, d) in [
            ("HUB", "A", 2.0),
            ("HUB", "B", 8.0),
            ("HUB", "C", 3.0),
            ("A", "B", 7.0),
            ("A", "C", 4.0),
            ("B", "C", 9.0),
        ] {
            graph.add_edge(a, b, d).unwrap();
        }
        ShortestPathTable::build(&graph, 1).unwrap()
    }

    fn load(fleet: &mut Fleet, registry: &mut ShipmentRegistry, vehicle: VehicleId) {
        for id in registry.ids() {
            let shipment = registry.get_mut(id).unwrap();
            fleet.get_mut(vehicle).unwrap().commit(id, &shipment.destination).unwrap();
            shipment.vehicle = Some(vehicle);
        }
    }

    #[test]
    fn deadline_stops_come_first() {
        let table = table();
        let config = RoutingConfig::default();
        let mut registry = ShipmentRegistry::new(vec![
            Shipment::new(1, "A", None, 1.0),
            Shipment::new(2, "B", Some(clock(10, 0)), 1.0),
            Shipment::new(3, "C", None, 1.0),
        ]);
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        load(&mut fleet, &mut registry, 1);

        RouteBuilder::new(&table, &config)
            .build(1, &mut registry, &mut fleet, clock(8, 0), false)
            .unwrap();

        let order: Vec<&str> = fleet
            .get(1)
            .unwrap()
            .queue
            .iter()
            .map(|b| b.location.as_str())
            .collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert!(fleet.get(1).unwrap().committed.is_empty());
    }

    #[test]
    fn unreachable_deadline_fails() {
        let table = table();
        let config = RoutingConfig::default();
        // 8.0 at 18 per hour is well past 08:10
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "B", Some(clock(8, 10)), 1.0)]);
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        load(&mut fleet, &mut registry, 1);

        let result = RouteBuilder::new(&table, &config).build(1, &mut registry, &mut fleet, clock(8, 0), false);
        assert!(matches!(result, Err(RoutingError::DeadlineMissed { .. })));
    }

    #[test]
    fn leeway_is_a_safety_margin() {
        let table = table();
        let config = RoutingConfig {
            deadline_leeway: TimeDelta::minutes(10),
            ..RoutingConfig::default()
        };
        // arrival 08:10 exactly meets the deadline but not with ten minutes to spare
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "C", Some(clock(8, 10)), 1.0)]);
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        load(&mut fleet, &mut registry, 1);

        let result = RouteBuilder::new(&table, &config).build(1, &mut registry, &mut fleet, clock(8, 0), false);
        assert!(matches!(result, Err(RoutingError::DeadlineMissed { .. })));
    }

    #[test]
    fn long_single_detour_is_evicted_to_overflow() {
        let table = table();
        let config = RoutingConfig::default();
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "A", None, 1.0), Shipment::new(2, "B", None, 1.0)]);
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        load(&mut fleet, &mut registry, 1);

        RouteBuilder::new(&table, &config)
            .build(1, &mut registry, &mut fleet, clock(8, 0), true)
            .unwrap();

        let vehicle = fleet.get(1).unwrap();
        assert_eq!(vehicle.queue.len(), 1);
        assert_eq!(vehicle.queue[0].location, "A");
        assert_eq!(fleet.get(3).unwrap().committed, vec![2]);
        assert_eq!(registry.get(2).unwrap().vehicle, Some(3));
    }

    #[test]
    fn reserved_stops_are_never_evicted() {
        let table = table();
        let config = RoutingConfig::default();
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "B", None, 1.0)]);
        registry.get_mut(1).unwrap().space_reserved = true;
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        load(&mut fleet, &mut registry, 1);

        RouteBuilder::new(&table, &config)
            .build(1, &mut registry, &mut fleet, clock(8, 0), true)
            .unwrap();
        assert_eq!(fleet.get(1).unwrap().queue.len(), 1);
        assert!(fleet.get(3).unwrap().committed.is_empty());
    }

    #[test]
    fn wrong_addresses_queue_as_pending() {
        let table = table();
        let config = RoutingConfig::default();
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "Old Rd", None, 1.0), Shipment::new(2, "A", None, 1.0)]);
        registry.get_mut(1).unwrap().wrong_address = true;
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        load(&mut fleet, &mut registry, 3);

        RouteBuilder::new(&table, &config)
            .build(3, &mut registry, &mut fleet, clock(8, 0), false)
            .unwrap();
        let queue = &fleet.get(3).unwrap().queue;
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].leg, Leg::Known(2.0));
        assert_eq!(queue[1].leg, Leg::Pending);
    }
}
