use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::constant::DEPOT;
use crate::distance::graph::LocationGraph;
use crate::domain::types::Location;
use crate::error::RoutingError;
use crate::setup::init_types::ShipmentRecord;
use crate::utils::round_to;

/// Complete graph over the depot plus `size - 1` stops, weights in [1.0, 12.0] at one decimal.
pub fn random_complete_graph(size: usize, seed: u64) -> Result<LocationGraph, RoutingError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut graph = LocationGraph::new();

    let addresses = location_names(size);
    for (index, address) in addresses.iter().enumerate() {
        graph.add_location(Location::new(address, &format!("841{:02}", index % 100)));
    }

    for i in 0..addresses.len() {
        for j in 0..i {
            let distance = round_to(rng.gen_range(1.0..=12.0), 1);
            graph.add_edge(&addresses[i], &addresses[j], distance)?;
        }
    }
    Ok(graph)
}

fn location_names(size: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(size);
    names.push(DEPOT.to_string());
    names.extend((1..size).map(|i| format!("{} Stop St", 100 + i)));
    names
}

/// Shipments without directives spread over the non-depot locations of `graph`.
///
/// Roughly one in five carries a 5:00 PM deadline; the rest are due end of day.
pub fn random_shipments(graph: &LocationGraph, count: usize, seed: u64) -> Vec<ShipmentRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let stops: Vec<&str> = graph.addresses().filter(|a| *a != DEPOT).collect();
    if stops.is_empty() {
        return vec![];
    }

    (1..=count as u32)
        .filter_map(|id| {
            let address = stops.choose(&mut rng)?;
            let zip = graph.location(address).map(|l| l.zip_code.clone()).unwrap_or_default();
            let deadline = if rng.gen_bool(0.2) { "5:00 PM" } else { "EOD" };
            Some(ShipmentRecord {
                id,
                address: address.to_string(),
                city: "Salt Lake City".to_string(),
                state: "UT".to_string(),
                zip,
                deadline: deadline.to_string(),
                mass: round_to(rng.gen_range(1.0..=40.0), 0),
                note: String::new(),
            })
        })
        .collect()
}

/// Seeded scenario used when no input files are available.
pub fn generate_random_inputs(
    location_count: usize,
    shipment_count: usize,
    seed: u64,
) -> Result<(LocationGraph, Vec<ShipmentRecord>), RoutingError> {
    let graph = random_complete_graph(location_count, seed)?;
    let shipments = random_shipments(&graph, shipment_count, seed);
    info!(
        "Generated {} locations and {} shipments (seed {})",
        graph.len(),
        shipments.len(),
        seed
    );
    Ok((graph, shipments))
}
