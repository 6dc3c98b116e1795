use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info, warn};

use crate::config::constant::{LOCATION_COUNT, SEED, SHIPMENT_COUNT};
use crate::config::RoutingConfig;
use crate::distance::graph::LocationGraph;
use crate::domain::directive::{Directive, DirectiveParser};
use crate::domain::shipment::{Shipment, ShipmentRegistry};
use crate::domain::types::Location;
use crate::error::RoutingError;
use crate::fixtures::data_generator::generate_random_inputs;
use crate::setup::init_types::ShipmentRecord;
use crate::utils::parse_clock;

/// Loads the location graph and shipments named in `config`.
///
/// Falls back to a seeded random scenario when either input file is missing.
pub fn setup(config: &RoutingConfig, parser: &DirectiveParser) -> Result<(LocationGraph, ShipmentRegistry), RoutingError> {
    let (graph, records) = if Path::new(&config.distance_csv).exists() && Path::new(&config.shipment_csv).exists() {
        let graph = read_distance_table(File::open(&config.distance_csv)?)?;
        let records = read_shipment_records(File::open(&config.shipment_csv)?)?;
        info!(
            "Loaded {} locations from {} and {} shipments from {}",
            graph.len(),
            config.distance_csv,
            records.len(),
            config.shipment_csv
        );
        (graph, records)
    } else {
        warn!(
            "Input files {} / {} not found. Falling back to random generation.",
            config.distance_csv, config.shipment_csv
        );
        let count = SHIPMENT_COUNT.min(config.vehicle_count * config.vehicle_capacity);
        generate_random_inputs(LOCATION_COUNT, count, SEED)?
    };

    graph.validate()?;
    if !graph.contains(&config.depot) {
        return Err(RoutingError::UnknownLocation(config.depot.clone()));
    }

    let shipments = build_shipments(records, parser, &graph, config)?;
    Ok((graph, ShipmentRegistry::new(shipments)))
}

/// Lower-triangular distance table: `address, zip, d0, d1, ..., di` where row `i`
/// ends with its own 0.0. Row 0 is the depot.
pub fn read_distance_table<R: Read>(reader: R) -> Result<LocationGraph, RoutingError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut graph = LocationGraph::new();
    let mut addresses: Vec<String> = vec![];

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let address = record
            .get(0)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| RoutingError::InvalidGraph(format!("row {} has no address", row)))?;
        let zip = record.get(1).unwrap_or_default();
        graph.add_location(Location::new(address, zip));
        addresses.push(address.to_string());

        for (column, target) in addresses.iter().take(row).enumerate() {
            let raw = record.get(column + 2).ok_or_else(|| {
                RoutingError::InvalidGraph(format!("row {} is missing distance {}", row, column))
            })?;
            let distance: f64 = raw
                .parse()
                .map_err(|_| RoutingError::InvalidGraph(format!("row {}: bad distance {:?}", row, raw)))?;
            graph.add_edge(address, target, distance)?;
        }
    }

    debug!("Distance table with {} rows read", addresses.len());
    Ok(graph)
}

pub fn read_shipment_records<R: Read>(reader: R) -> Result<Vec<ShipmentRecord>, RoutingError> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let records = reader
        .deserialize::<ShipmentRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Turns CSV rows into shipments, parsing deadlines and directives once.
pub fn build_shipments(
    records: Vec<ShipmentRecord>,
    parser: &DirectiveParser,
    graph: &LocationGraph,
    config: &RoutingConfig,
) -> Result<Vec<Shipment>, RoutingError> {
    let mut shipments = Vec::with_capacity(records.len());

    for record in records {
        let deadline = match record.deadline.trim() {
            "" => None,
            eod if eod.eq_ignore_ascii_case("eod") => None,
            raw => Some(parse_clock(raw).ok_or_else(|| {
                RoutingError::InvalidConfig(format!("shipment #{}: bad deadline {:?}", record.id, raw))
            })?),
        };
        let directive = parser.parse(&record.note)?;

        // A wrong address is expected to be missing from the graph until corrected
        if directive == Some(Directive::WrongAddress) {
            if !graph.contains(&config.corrected_address) {
                return Err(RoutingError::UnknownLocation(config.corrected_address.clone()));
            }
        } else if !graph.contains(record.address.trim()) {
            return Err(RoutingError::UnknownLocation(record.address));
        }

        shipments.push(
            Shipment::new(record.id, &record.address, deadline, record.mass).with_directive(&record.note, directive),
        );
    }

    Ok(shipments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock;

    const TABLE: &str = "\
HUB,84107,0.0
1060 Dalton Ave S,84104,7.2,0.0
1330 2100 S,84106,3.8,7.1,0.0
410 S State St,84111,6.0,4.4,5.6,0.0
";

    const SHIPMENTS: &str = "\
id,address,city,state,zip,deadline,mass,note
1,1060 Dalton Ave S,Salt Lake City,UT,84104,10:30 AM,21,
2,1330 2100 S,Salt Lake City,UT,84106,EOD,44,Can only be on truck 2
3,300 State St,Salt Lake City,UT,84103,EOD,2,Wrong address listed
";

    #[test]
    fn reads_lower_triangular_table() {
        let graph = read_distance_table(TABLE.as_bytes()).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.edge("HUB", "1060 Dalton Ave S"), Some(7.2));
        assert_eq!(graph.edge("1330 2100 S", "1060 Dalton Ave S"), Some(7.1));
        assert_eq!(graph.location("HUB").unwrap().zip_code, "84107");
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn short_row_is_an_invalid_graph() {
        let broken = "HUB,84107,0.0\nA,84104\n";
        assert!(matches!(
            read_distance_table(broken.as_bytes()),
            Err(RoutingError::InvalidGraph(_))
        ));
    }

    #[test]
    fn builds_shipments_with_directives() {
        let graph = read_distance_table(TABLE.as_bytes()).unwrap();
        let records = read_shipment_records(SHIPMENTS.as_bytes()).unwrap();
        let shipments = build_shipments(records, &DirectiveParser::default(), &graph, &RoutingConfig::default()).unwrap();

        assert_eq!(shipments.len(), 3);
        assert_eq!(shipments[0].deadline, Some(clock(10, 30)));
        assert_eq!(shipments[1].deadline, None);
        assert_eq!(shipments[1].directive, Some(Directive::VehicleRestricted(2)));
        assert_eq!(shipments[2].directive, Some(Directive::WrongAddress));
    }

    #[test]
    fn unknown_destination_is_rejected() {
        let graph = read_distance_table(TABLE.as_bytes()).unwrap();
        let records = read_shipment_records("id,address,deadline\n7,Nowhere Rd,EOD\n".as_bytes()).unwrap();
        assert!(matches!(
            build_shipments(records, &DirectiveParser::default(), &graph, &RoutingConfig::default()),
            Err(RoutingError::UnknownLocation(_))
        ));
    }
}
