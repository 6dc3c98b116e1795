use std::fs::File;
use std::io::{BufWriter, Write};

use chrono::TimeDelta;
use colored::*;
use csv::Writer;
use serde::Serialize;

use crate::domain::shipment::ShipmentRegistry;
use crate::domain::types::{OperatorId, ShipmentId, ShipmentStatus, VehicleId};
use crate::domain::vehicle::Fleet;
use crate::error::RoutingError;
use crate::utils::format_clock;

#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub location: String,
    pub time: String,
    /// Cumulative distance when the stop was reached.
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleReport {
    pub id: VehicleId,
    pub operator: Option<OperatorId>,
    pub departure: String,
    pub finish: String,
    pub mileage: f64,
    pub delivered: Vec<ShipmentId>,
    pub stops: Vec<StopReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub time: String,
    pub status: ShipmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentReport {
    pub id: ShipmentId,
    pub destination: String,
    /// `EOD` when the shipment has no deadline.
    pub deadline: String,
    pub mass: f64,
    pub note: String,
    pub vehicle: Option<VehicleId>,
    pub delivered_at: Option<String>,
    pub history: Vec<StatusEntry>,
}

/// Everything the reporting front end consumes after a run.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryLog {
    pub finished_at: String,
    pub total_mileage: f64,
    pub vehicles: Vec<VehicleReport>,
    pub shipments: Vec<ShipmentReport>,
}

impl DeliveryLog {
    pub fn collect(registry: &ShipmentRegistry, fleet: &Fleet, finished_at: TimeDelta) -> Self {
        let vehicles = fleet
            .iter()
            .map(|vehicle| VehicleReport {
                id: vehicle.id,
                operator: vehicle.operator,
                departure: format_clock(vehicle.departure),
                finish: format_clock(vehicle.time),
                mileage: vehicle.mileage,
                delivered: vehicle.delivered.clone(),
                stops: vehicle
                    .history
                    .iter()
                    .map(|visit| StopReport {
                        location: visit.location.clone(),
                        time: format_clock(visit.time),
                        distance: visit.distance,
                    })
                    .collect(),
            })
            .collect();

        let shipments = registry
            .iter()
            .map(|shipment| ShipmentReport {
                id: shipment.id,
                destination: shipment.destination.clone(),
                deadline: shipment.deadline.map_or_else(|| "EOD".to_string(), format_clock),
                mass: shipment.mass,
                note: shipment.note.clone(),
                vehicle: shipment.vehicle,
                delivered_at: shipment.delivered_at().map(format_clock),
                history: shipment
                    .history
                    .iter()
                    .map(|(time, status)| StatusEntry {
                        time: format_clock(*time),
                        status: *status,
                    })
                    .collect(),
            })
            .collect();

        DeliveryLog {
            finished_at: format_clock(finished_at),
            total_mileage: fleet.total_mileage(),
            vehicles,
            shipments,
        }
    }

    pub fn save_json(&self, filename: &str) -> Result<(), RoutingError> {
        let mut writer = BufWriter::new(File::create(filename)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// One row per status change: `shipment,vehicle,time,status`.
    pub fn save_status_csv(&self, filename: &str) -> Result<(), RoutingError> {
        let mut wtr = Writer::from_path(filename)?;
        self.write_status_csv(&mut wtr)?;
        wtr.flush()?;
        Ok(())
    }

    fn write_status_csv<W: Write>(&self, wtr: &mut Writer<W>) -> Result<(), RoutingError> {
        wtr.write_record(["shipment", "vehicle", "time", "status"])?;
        for shipment in &self.shipments {
            let vehicle = shipment.vehicle.map(|v| v.to_string()).unwrap_or_default();
            for entry in &shipment.history {
                wtr.write_record([
                    shipment.id.to_string(),
                    vehicle.clone(),
                    entry.time.clone(),
                    entry.status.to_string(),
                ])?;
            }
        }
        Ok(())
    }
}

/// Shipment statuses and vehicle positions as they stood at `time`.
pub fn print_snapshot(registry: &ShipmentRegistry, fleet: &Fleet, time: TimeDelta) {
    println!("{}", format!("Status at {}", format_clock(time)).bold());
    for vehicle in fleet.iter() {
        match vehicle.position_at(time) {
            Some((visit, true)) => println!(
                "  Vehicle #{}: left {} ({:.1} driven)",
                vehicle.id, visit.location, visit.distance
            ),
            Some((visit, false)) => println!(
                "  Vehicle #{}: at {} ({:.1} driven)",
                vehicle.id, visit.location, visit.distance
            ),
            None => println!("  Vehicle #{}: not started", vehicle.id),
        }
    }
    for shipment in registry.iter() {
        let status = shipment.status_at(time);
        let label = match status {
            ShipmentStatus::Delivered => status.to_string().green(),
            ShipmentStatus::Delayed => status.to_string().yellow(),
            _ => status.to_string().normal(),
        };
        println!("  #{:>3} {:<40} {}", shipment.id, shipment.destination, label);
    }
}

pub fn print_summary(log: &DeliveryLog) {
    let all_delivered = log.shipments.iter().all(|s| s.delivered_at.is_some());
    let headline = format!(
        "{} shipments delivered by {}, total mileage {:.1}",
        log.shipments.len(),
        log.finished_at,
        log.total_mileage
    );
    if all_delivered {
        println!("{}", headline.green());
    } else {
        println!("{}", headline.red());
    }
    for vehicle in &log.vehicles {
        println!(
            "Vehicle #{}: {} -> {}, {:.1} driven, {} delivered",
            vehicle.id,
            vehicle.departure,
            vehicle.finish,
            vehicle.mileage,
            vehicle.delivered.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shipment::Shipment;
    use crate::utils::clock;

    fn delivered_run() -> (ShipmentRegistry, Fleet) {
        let mut registry = ShipmentRegistry::new(vec![Shipment::new(4, "A", Some(clock(9, 0)), 12.0)]);
        let mut fleet = Fleet::new(1, 1, 16, "HUB", clock(8, 0));
        {
            let shipment = registry.get_mut(4).unwrap();
            shipment.vehicle = Some(1);
            shipment.set_status(ShipmentStatus::InTransit, clock(8, 0)).unwrap();
            shipment.set_status(ShipmentStatus::Delivered, clock(8, 20)).unwrap();
        }
        let vehicle = fleet.get_mut(1).unwrap();
        vehicle.arrive("A", clock(8, 20), 6.0);
        vehicle.delivered.push(4);
        (registry, fleet)
    }

    #[test]
    fn log_carries_histories_and_mileage() {
        let (registry, fleet) = delivered_run();
        let log = DeliveryLog::collect(&registry, &fleet, clock(8, 20));

        assert_eq!(log.total_mileage, 6.0);
        assert_eq!(log.finished_at, "08:20:00");
        assert_eq!(log.vehicles[0].stops.len(), 2);
        assert_eq!(log.vehicles[0].stops[1].location, "A");
        assert_eq!(log.shipments[0].deadline, "09:00:00");
        assert_eq!(log.shipments[0].delivered_at.as_deref(), Some("08:20:00"));
        assert_eq!(log.shipments[0].history.len(), 3);

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["shipments"][0]["history"][2]["status"], "Delivered");
    }

    #[test]
    fn status_csv_has_one_row_per_change() {
        let (registry, fleet) = delivered_run();
        let log = DeliveryLog::collect(&registry, &fleet, clock(8, 20));

        let mut wtr = Writer::from_writer(vec![]);
        log.write_status_csv(&mut wtr).unwrap();
        let bytes = wtr.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "shipment,vehicle,time,status");
        assert_eq!(lines[3], "4,1,08:20:00,Delivered");
    }
}
