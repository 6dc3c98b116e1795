use std::env;
use std::str::FromStr;

use chrono::TimeDelta;
use dotenv::dotenv;
use tracing::{debug, info};

use crate::error::RoutingError;
use crate::utils::{clock, parse_clock};

pub mod constant {
    pub(crate) const DEPOT: &str = "HUB";
    pub(crate) const TRUCK_SPEED: f64 = 18.0;
    pub(crate) const VEHICLE_COUNT: usize = 3;
    pub(crate) const OPERATOR_COUNT: usize = 2;
    pub(crate) const VEHICLE_CAPACITY: usize = 16;
    pub(crate) const START_TIME: (u32, u32) = (8, 0);
    pub(crate) const CORRECTION_TIME: (u32, u32) = (10, 20);
    pub(crate) const CORRECTED_ADDRESS: &str = "410 S State St";
    pub(crate) const DISTANCE_PRECISION: u32 = 1;
    pub(crate) const DETOUR_THRESHOLD: f64 = 6.0;
    pub(crate) const DEADLINE_LEEWAY_MINUTES: i64 = 0;
    pub(crate) const SEED: u64 = 64;
    pub(crate) const LOCATION_COUNT: usize = 12;
    pub(crate) const SHIPMENT_COUNT: usize = 30;
    pub(crate) const DISTANCE_CSV_PATH: &str = "data/distance_table.csv";
    pub(crate) const SHIPMENT_CSV_PATH: &str = "data/shipments.csv";
    pub(crate) const REPORT_CSV_PATH: &str = "status_history.csv";
    pub(crate) const REPORT_JSON_PATH: &str = "delivery_log.json";
}

/// Runtime tunables for a dispatch run.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub depot: String,
    /// Distance units per hour.
    pub speed: f64,
    pub vehicle_count: usize,
    pub operator_count: usize,
    pub vehicle_capacity: usize,
    pub start_time: TimeDelta,
    pub correction_time: TimeDelta,
    pub corrected_address: String,
    pub distance_precision: u32,
    /// Leg length above which a single low-priority stop is handed to the overflow vehicle.
    pub detour_threshold: f64,
    /// Safety margin: a deadline stop is accepted only if `arrival + leeway <= deadline`.
    pub deadline_leeway: TimeDelta,
    /// Vehicle receiving evicted detour stops. Defaults to the last vehicle of the fleet.
    pub overflow_vehicle: Option<usize>,
    pub return_to_depot: bool,
    pub distance_csv: String,
    pub shipment_csv: String,
    pub report_csv: String,
    pub report_json: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            depot: constant::DEPOT.to_string(),
            speed: constant::TRUCK_SPEED,
            vehicle_count: constant::VEHICLE_COUNT,
            operator_count: constant::OPERATOR_COUNT,
            vehicle_capacity: constant::VEHICLE_CAPACITY,
            start_time: clock(constant::START_TIME.0, constant::START_TIME.1),
            correction_time: clock(constant::CORRECTION_TIME.0, constant::CORRECTION_TIME.1),
            corrected_address: constant::CORRECTED_ADDRESS.to_string(),
            distance_precision: constant::DISTANCE_PRECISION,
            detour_threshold: constant::DETOUR_THRESHOLD,
            deadline_leeway: TimeDelta::minutes(constant::DEADLINE_LEEWAY_MINUTES),
            overflow_vehicle: None,
            return_to_depot: false,
            distance_csv: constant::DISTANCE_CSV_PATH.to_string(),
            shipment_csv: constant::SHIPMENT_CSV_PATH.to_string(),
            report_csv: constant::REPORT_CSV_PATH.to_string(),
            report_json: constant::REPORT_JSON_PATH.to_string(),
        }
    }
}

impl RoutingConfig {
    /// Defaults overridden by `COURIER_*` variables from the environment or a `.env` file.
    pub fn from_env() -> Result<Self, RoutingError> {
        dotenv().ok();
        let mut config = RoutingConfig::default();

        if let Some(speed) = env_parse::<f64>("COURIER_SPEED")? {
            config.speed = speed;
        }
        if let Some(count) = env_parse::<usize>("COURIER_VEHICLES")? {
            config.vehicle_count = count;
        }
        if let Some(count) = env_parse::<usize>("COURIER_OPERATORS")? {
            config.operator_count = count;
        }
        if let Some(capacity) = env_parse::<usize>("COURIER_CAPACITY")? {
            config.vehicle_capacity = capacity;
        }
        if let Some(threshold) = env_parse::<f64>("COURIER_DETOUR_THRESHOLD")? {
            config.detour_threshold = threshold;
        }
        if let Some(minutes) = env_parse::<i64>("COURIER_DEADLINE_LEEWAY_MIN")? {
            config.deadline_leeway = TimeDelta::minutes(minutes);
        }
        if let Some(start) = env_clock("COURIER_START_TIME")? {
            config.start_time = start;
        }
        if let Some(correction) = env_clock("COURIER_CORRECTION_TIME")? {
            config.correction_time = correction;
        }
        if let Ok(address) = env::var("COURIER_CORRECTED_ADDRESS") {
            config.corrected_address = address.trim().to_string();
        }
        if let Some(vehicle) = env_parse::<usize>("COURIER_OVERFLOW_VEHICLE")? {
            config.overflow_vehicle = Some(vehicle);
        }
        if let Some(flag) = env_parse::<bool>("COURIER_RETURN_TO_DEPOT")? {
            config.return_to_depot = flag;
        }
        if let Ok(path) = env::var("COURIER_DISTANCE_CSV") {
            config.distance_csv = path;
        }
        if let Ok(path) = env::var("COURIER_SHIPMENT_CSV") {
            config.shipment_csv = path;
        }
        if let Ok(path) = env::var("COURIER_REPORT_CSV") {
            config.report_csv = path;
        }
        if let Ok(path) = env::var("COURIER_REPORT_JSON") {
            config.report_json = path;
        }

        config.validate()?;
        info!(
            "Loaded routing config: {} vehicles, {} operators, capacity {}, speed {}",
            config.vehicle_count, config.operator_count, config.vehicle_capacity, config.speed
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.vehicle_count == 0 {
            return Err(RoutingError::InvalidConfig("fleet needs at least one vehicle".into()));
        }
        if self.operator_count == 0 {
            return Err(RoutingError::InvalidConfig("fleet needs at least one operator".into()));
        }
        if self.operator_count > self.vehicle_count {
            return Err(RoutingError::InvalidConfig(format!(
                "{} operators for {} vehicles",
                self.operator_count, self.vehicle_count
            )));
        }
        if self.vehicle_capacity == 0 {
            return Err(RoutingError::InvalidConfig("vehicle capacity must be positive".into()));
        }
        if !(self.speed > 0.0) {
            return Err(RoutingError::InvalidConfig(format!("invalid speed {}", self.speed)));
        }
        if self.deadline_leeway < TimeDelta::zero() {
            return Err(RoutingError::InvalidConfig("deadline leeway cannot be negative".into()));
        }
        if let Some(vehicle) = self.overflow_vehicle {
            if vehicle == 0 || vehicle > self.vehicle_count {
                return Err(RoutingError::InvalidConfig(format!(
                    "overflow vehicle {} is not part of the fleet",
                    vehicle
                )));
            }
        }
        Ok(())
    }

    /// The vehicle that takes evicted detour stops.
    pub fn overflow_vehicle_id(&self) -> usize {
        self.overflow_vehicle.unwrap_or(self.vehicle_count)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, RoutingError> {
    match env::var(key) {
        Ok(raw) => {
            debug!("{} = {}", key, raw);
            raw.trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| RoutingError::InvalidConfig(format!("cannot parse {}={}", key, raw)))
        }
        Err(_) => Ok(None),
    }
}

fn env_clock(key: &str) -> Result<Option<TimeDelta>, RoutingError> {
    match env::var(key) {
        Ok(raw) => parse_clock(&raw)
            .map(Some)
            .ok_or_else(|| RoutingError::InvalidConfig(format!("cannot parse {}={}", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RoutingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.overflow_vehicle_id(), 3);
        assert_eq!(config.start_time, clock(8, 0));
    }

    #[test]
    fn rejects_more_operators_than_vehicles() {
        let config = RoutingConfig {
            operator_count: 4,
            ..RoutingConfig::default()
        };
        assert!(matches!(config.validate(), Err(RoutingError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_overflow_vehicle_outside_fleet() {
        let config = RoutingConfig {
            overflow_vehicle: Some(7),
            ..RoutingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
