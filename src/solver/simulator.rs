use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::TimeDelta;
use tracing::{debug, info, span, warn, Level};

use crate::config::RoutingConfig;
use crate::distance::matrix::ShortestPathTable;
use crate::domain::shipment::ShipmentRegistry;
use crate::domain::types::{Leg, ShipmentStatus, VehicleId, VehiclePhase};
use crate::domain::vehicle::Fleet;
use crate::error::RoutingError;
use crate::solver::route_builder::RouteBuilder;
use crate::utils::{format_clock, travel_time};

/// Drives every vehicle through its queue and hands operators over to idle vehicles.
pub struct Simulator<'a> {
    table: &'a ShortestPathTable,
    config: &'a RoutingConfig,
    builder: RouteBuilder<'a>,
}

impl<'a> Simulator<'a> {
    pub fn new(table: &'a ShortestPathTable, config: &'a RoutingConfig) -> Self {
        Simulator {
            table,
            config,
            builder: RouteBuilder::new(table, config),
        }
    }

    /// Runs the whole day; returns the time the last vehicle finished.
    pub fn run(&self, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<TimeDelta, RoutingError> {
        let staffed = fleet.staffed();
        for vehicle_id in &staffed {
            let departure = fleet.get(*vehicle_id)?.departure;
            self.builder.build(*vehicle_id, registry, fleet, departure, true)?;
        }

        // Operators ordered by the time they are back at the depot
        let mut free: BinaryHeap<Reverse<(TimeDelta, VehicleId)>> = BinaryHeap::new();
        for vehicle_id in staffed {
            self.drive(vehicle_id, registry, fleet)?;
            free.push(Reverse((self.return_time(vehicle_id, fleet)?, vehicle_id)));
        }

        while let Some(&waiting_id) = fleet.waiting().first() {
            let Some(Reverse((_, freed_id))) = free.pop() else {
                return Err(RoutingError::InvalidConfig("no operator left to staff waiting vehicles".into()));
            };
            let back = self.return_to_depot(freed_id, fleet)?;

            let operator = fleet.get_mut(freed_id)?.operator.take();
            let waiting = fleet.get_mut(waiting_id)?;
            waiting.operator = operator;
            waiting.departure = waiting.departure.max(back);
            waiting.time = waiting.departure;
            let departure = waiting.departure;
            info!(
                "Operator of vehicle #{} takes over vehicle #{} at {}",
                freed_id,
                waiting_id,
                format_clock(departure)
            );

            self.builder.build(waiting_id, registry, fleet, departure, false)?;
            self.drive(waiting_id, registry, fleet)?;
            free.push(Reverse((self.return_time(waiting_id, fleet)?, waiting_id)));
        }

        if self.config.return_to_depot {
            let working: Vec<VehicleId> = fleet.iter().filter(|v| v.operator.is_some()).map(|v| v.id).collect();
            for vehicle_id in working {
                self.return_to_depot(vehicle_id, fleet)?;
            }
        }

        for shipment in registry.iter() {
            if !shipment.is_delivered() {
                return Err(RoutingError::Undelivered(shipment.id));
            }
        }

        let end = fleet.iter().map(|v| v.time).max().unwrap_or(self.config.start_time);
        info!(
            "All {} shipments delivered by {}, total mileage {:.1}",
            registry.len(),
            format_clock(end),
            fleet.total_mileage()
        );
        Ok(end)
    }

    /// Loads the vehicle, then delivers its queue in order.
    fn drive(&self, vehicle_id: VehicleId, registry: &mut ShipmentRegistry, fleet: &mut Fleet) -> Result<(), RoutingError> {
        let span = span!(Level::DEBUG, "drive", vehicle = vehicle_id);
        let _guard = span.enter();

        let vehicle = fleet.get_mut(vehicle_id)?;
        let loaded: Vec<_> = vehicle.queue.iter().flat_map(|b| b.shipments.iter().copied()).collect();

        // Cannot leave before every delayed shipment has reached the depot
        let mut departure = vehicle.departure;
        for id in &loaded {
            if let Some(ready) = registry.get(*id)?.ready_time {
                if registry.get(*id)?.status == ShipmentStatus::Delayed && ready > departure {
                    warn!("Vehicle #{} waits for shipment #{} until {}", vehicle_id, id, format_clock(ready));
                    departure = ready;
                }
            }
        }
        vehicle.departure = departure;
        vehicle.time = vehicle.time.max(departure);
        let departure = vehicle.time;

        for id in &loaded {
            let shipment = registry.get_mut(*id)?;
            if shipment.status == ShipmentStatus::Delayed {
                let ready = shipment.ready_time.unwrap_or(departure);
                shipment.set_status(ShipmentStatus::AtDepot, ready)?;
            }
            shipment.set_status(ShipmentStatus::InTransit, departure)?;
        }
        if let Some(first) = vehicle.queue.front() {
            vehicle.phase = VehiclePhase::EnRoute {
                since: departure,
                next: first.location.clone(),
            };
        }
        info!("Vehicle #{} departs at {} with {} shipment(s)", vehicle_id, format_clock(departure), loaded.len());

        // Stored legs hold only while the vehicle follows the sequenced order
        let mut planned_from = vehicle.location.clone();
        while let Some(mut bundle) = vehicle.queue.pop_front() {
            if bundle.leg == Leg::Pending {
                let ready = bundle
                    .shipments
                    .iter()
                    .filter_map(|id| registry.get(*id).ok().and_then(|s| s.ready_time))
                    .max()
                    .unwrap_or(vehicle.time);

                if vehicle.time < ready {
                    let only_pending = vehicle.queue.iter().all(|b| b.leg == Leg::Pending);
                    if only_pending {
                        debug!("Vehicle #{} idles until {}", vehicle_id, format_clock(ready));
                        vehicle.wait_until(ready);
                    }
                    vehicle.queue.push_back(bundle);
                    continue;
                }

                for id in &bundle.shipments {
                    let shipment = registry.get_mut(*id)?;
                    info!(
                        "Shipment #{} address corrected to {} at {}",
                        id,
                        self.config.corrected_address,
                        format_clock(vehicle.time)
                    );
                    shipment.destination = self.config.corrected_address.clone();
                    shipment.wrong_address = false;
                }
                bundle.location = self.config.corrected_address.clone();
            }

            let distance = match bundle.leg {
                Leg::Known(distance) if vehicle.location == planned_from => distance,
                _ => self.table.distance(&vehicle.location, &bundle.location)?,
            };
            if let Leg::Known(_) = bundle.leg {
                planned_from = bundle.location.clone();
            }
            let arrival = vehicle.time + travel_time(distance, self.config.speed);

            for id in &bundle.shipments {
                let shipment = registry.get_mut(*id)?;
                if let Some(deadline) = shipment.deadline {
                    if arrival > deadline {
                        return Err(RoutingError::DeadlineMissed {
                            destination: bundle.location.clone(),
                            deadline: format_clock(deadline),
                            arrival: format_clock(arrival),
                        });
                    }
                }
                shipment.set_status(ShipmentStatus::Delivered, arrival)?;
                vehicle.delivered.push(*id);
            }
            vehicle.arrive(&bundle.location, arrival, distance);
            debug!(
                "Vehicle #{} delivered {:?} at {} ({} at {:.1})",
                vehicle_id,
                bundle.shipments,
                bundle.location,
                format_clock(arrival),
                vehicle.mileage
            );
        }

        Ok(())
    }

    /// When the vehicle would be back at the depot, without moving it.
    fn return_time(&self, vehicle_id: VehicleId, fleet: &Fleet) -> Result<TimeDelta, RoutingError> {
        let vehicle = fleet.get(vehicle_id)?;
        if vehicle.location == self.config.depot {
            return Ok(vehicle.time);
        }
        let distance = self.table.distance(&vehicle.location, &self.config.depot)?;
        Ok(vehicle.time + travel_time(distance, self.config.speed))
    }

    fn return_to_depot(&self, vehicle_id: VehicleId, fleet: &mut Fleet) -> Result<TimeDelta, RoutingError> {
        let vehicle = fleet.get_mut(vehicle_id)?;
        if vehicle.location != self.config.depot {
            let distance = self.table.distance(&vehicle.location, &self.config.depot)?;
            let arrival = vehicle.time + travel_time(distance, self.config.speed);
            vehicle.arrive(&self.config.depot, arrival, distance);
        }
        vehicle.phase = VehiclePhase::ReturnedToDepot(vehicle.time);
        debug!("Vehicle #{} back at {} by {}", vehicle_id, self.config.depot, format_clock(vehicle.time));
        Ok(vehicle.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::graph::LocationGraph;
    use crate::domain::shipment::Shipment;
    use crate::domain::types::{Location, StopBundle};
    use crate::utils::clock;

    /// HUB-A 5.4, HUB-B 3, A-B 5.4; "Fixed Rd" is the corrected address.
    fn table() -> ShortestPathTable {
        let mut graph = LocationGraph::new();
        for address in ["HUB", "A", "B", "Fixed Rd"] {
            graph.add_location(Location::new(address, "84100"));
        }
        for (a, b, d) in [
            ("HUB", "A", 5.4),
            ("HUB", "B", 3.0),
            ("A", "B", 5.4),
            ("HUB", "Fixed Rd", 1.8),
            ("A", "Fixed Rd", 5.4),
            ("B", "Fixed Rd", 1.8),
        ] {
            graph.add_edge(a, b, d).unwrap();
        }
        ShortestPathTable::build(&graph, 1).unwrap()
    }

    fn config() -> RoutingConfig {
        RoutingConfig {
            corrected_address: "Fixed Rd".into(),
            correction_time: clock(10, 20),
            ..RoutingConfig::default()
        }
    }

    fn commit(fleet: &mut Fleet, registry: &mut ShipmentRegistry, id: u32, vehicle: VehicleId) {
        let shipment = registry.get_mut(id).unwrap();
        fleet.get_mut(vehicle).unwrap().commit(id, &shipment.destination).unwrap();
        shipment.vehicle = Some(vehicle);
    }

    #[test]
    fn operator_takes_over_waiting_vehicle_at_return_time() {
        let table = table();
        let config = config();
        let mut registry = ShipmentRegistry::new(vec![
            Shipment::new(1, "A", None, 1.0),
            Shipment::new(2, "B", None, 1.0),
            Shipment::new(3, "B", None, 1.0),
        ]);
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        commit(&mut fleet, &mut registry, 1, 1);
        commit(&mut fleet, &mut registry, 2, 2);
        commit(&mut fleet, &mut registry, 3, 3);

        Simulator::new(&table, &config).run(&mut registry, &mut fleet).unwrap();

        // vehicle 2: out 3.0 and back 3.0 at 18 per hour, free at 08:20
        let third = fleet.get(3).unwrap();
        assert_eq!(third.departure, clock(8, 20));
        assert_eq!(registry.get(3).unwrap().delivered_at(), Some(clock(8, 30)));
        assert_eq!(registry.get(3).unwrap().status_at(clock(8, 10)), ShipmentStatus::AtDepot);
        assert!(fleet.get(2).unwrap().operator.is_none());
        assert!(third.operator.is_some());
        assert_eq!(fleet.get(2).unwrap().phase, VehiclePhase::ReturnedToDepot(clock(8, 20)));
    }

    #[test]
    fn pending_address_waits_for_correction() {
        let table = table();
        let config = config();
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "Old Rd", None, 1.0)]);
        {
            let shipment = registry.get_mut(1).unwrap();
            shipment.wrong_address = true;
            shipment.ready_time = Some(config.correction_time);
        }
        let mut fleet = Fleet::new(1, 1, 16, "HUB", clock(8, 0));
        commit(&mut fleet, &mut registry, 1, 1);

        Simulator::new(&table, &config).run(&mut registry, &mut fleet).unwrap();

        let shipment = registry.get(1).unwrap();
        assert_eq!(shipment.destination, "Fixed Rd");
        assert!(!shipment.wrong_address);
        // 1.8 at 18 per hour after idling until 10:20
        assert_eq!(shipment.delivered_at(), Some(clock(10, 26)));
        assert_eq!(shipment.status_at(clock(9, 0)), ShipmentStatus::InTransit);

        let vehicle = fleet.get(1).unwrap();
        let (visit, moving) = vehicle.position_at(clock(9, 0)).unwrap();
        assert_eq!(visit.location, "HUB");
        assert!(!moving);
        assert!(vehicle.position_at(clock(10, 22)).unwrap().1);
    }

    #[test]
    fn first_operator_back_at_the_depot_takes_over() {
        let mut graph = LocationGraph::new();
        for address in ["HUB", "Far", "Near"] {
            graph.add_location(Location::new(address, "84100"));
        }
        graph.add_edge("HUB", "Far", 9.0).unwrap();
        graph.add_edge("HUB", "Near", 0.3).unwrap();
        graph.add_edge("Far", "Near", 9.0).unwrap();
        let table = ShortestPathTable::build(&graph, 1).unwrap();
        let config = config();

        let mut registry = ShipmentRegistry::new(vec![
            Shipment::new(1, "Far", None, 1.0),
            Shipment::new(2, "Near", None, 1.0),
            Shipment::new(3, "Near", None, 1.0),
        ]);
        registry.get_mut(1).unwrap().space_reserved = true;
        {
            let shipment = registry.get_mut(2).unwrap();
            shipment.set_status(ShipmentStatus::Delayed, TimeDelta::zero()).unwrap();
            shipment.ready_time = Some(clock(8, 40));
        }
        let mut fleet = Fleet::new(3, 2, 16, "HUB", clock(8, 0));
        commit(&mut fleet, &mut registry, 1, 1);
        commit(&mut fleet, &mut registry, 2, 2);
        commit(&mut fleet, &mut registry, 3, 3);

        Simulator::new(&table, &config).run(&mut registry, &mut fleet).unwrap();

        // vehicle 1 finishes first (08:30) but is back later (09:00) than vehicle 2 (08:42)
        assert_eq!(fleet.get(1).unwrap().time, clock(8, 30));
        assert_eq!(registry.get(2).unwrap().delivered_at(), Some(clock(8, 41)));
        let third = fleet.get(3).unwrap();
        assert_eq!(third.departure, clock(8, 42));
        assert_eq!(registry.get(3).unwrap().delivered_at(), Some(clock(8, 43)));
        assert!(fleet.get(1).unwrap().operator.is_some());
        assert!(fleet.get(2).unwrap().operator.is_none());
    }

    #[test]
    fn planned_leg_is_driven_as_sequenced() {
        let table = table();
        let config = config();
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "B", None, 1.0)]);
        let mut fleet = Fleet::new(1, 1, 16, "HUB", clock(8, 0));
        registry.get_mut(1).unwrap().vehicle = Some(1);
        fleet.get_mut(1).unwrap().queue.push_back(StopBundle {
            location: "B".into(),
            shipments: vec![1],
            leg: Leg::Known(4.0),
        });

        Simulator::new(&table, &config).run(&mut registry, &mut fleet).unwrap();

        assert_eq!(fleet.get(1).unwrap().mileage, 4.0);
        assert_eq!(
            registry.get(1).unwrap().delivered_at(),
            Some(clock(8, 0) + travel_time(4.0, config.speed))
        );
    }

    #[test]
    fn delayed_shipment_history() {
        let table = table();
        let config = config();
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "B", None, 1.0)]);
        {
            let shipment = registry.get_mut(1).unwrap();
            shipment.set_status(ShipmentStatus::Delayed, TimeDelta::zero()).unwrap();
            shipment.ready_time = Some(clock(9, 5));
        }
        let mut fleet = Fleet::new(1, 1, 16, "HUB", clock(8, 0));
        commit(&mut fleet, &mut registry, 1, 1);

        Simulator::new(&table, &config).run(&mut registry, &mut fleet).unwrap();

        let shipment = registry.get(1).unwrap();
        assert_eq!(shipment.status_at(clock(8, 30)), ShipmentStatus::Delayed);
        assert_eq!(shipment.status_at(clock(9, 5)), ShipmentStatus::InTransit);
        assert_eq!(shipment.delivered_at(), Some(clock(9, 15)));
    }

    #[test]
    fn late_delivery_is_reported() {
        let table = table();
        let config = config();
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "A", Some(clock(8, 15)), 1.0)]);
        let mut fleet = Fleet::new(1, 1, 16, "HUB", clock(8, 0));
        commit(&mut fleet, &mut registry, 1, 1);

        let result = Simulator::new(&table, &config).run(&mut registry, &mut fleet);
        assert!(matches!(result, Err(RoutingError::DeadlineMissed { .. })));
    }

    #[test]
    fn optional_return_adds_the_way_home() {
        let table = table();
        let config = RoutingConfig {
            return_to_depot: true,
            ..config()
        };
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(1, "B", None, 1.0)]);
        let mut fleet = Fleet::new(1, 1, 16, "HUB", clock(8, 0));
        commit(&mut fleet, &mut registry, 1, 1);

        Simulator::new(&table, &config).run(&mut registry, &mut fleet).unwrap();
        let vehicle = fleet.get(1).unwrap();
        assert_eq!(vehicle.mileage, 6.0);
        assert_eq!(vehicle.location, "HUB");
    }
}
