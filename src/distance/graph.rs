use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::types::Location;
use crate::error::RoutingError;

/// Weighted, undirected graph over location addresses.
///
/// Each adjacency list is kept sorted by distance, nearest first.
#[derive(Debug, Clone, Default)]
pub struct LocationGraph {
    locations: BTreeMap<String, Location>,
    adjacency: BTreeMap<String, Vec<(String, f64)>>,
}

impl LocationGraph {
    pub fn new() -> Self {
        LocationGraph::default()
    }

    pub fn add_location(&mut self, location: Location) {
        self.adjacency.entry(location.address.clone()).or_default();
        self.locations.insert(location.address.clone(), location);
    }

    /// Adds `a <-> b` with the same weight both ways, replacing an existing edge.
    pub fn add_edge(&mut self, a: &str, b: &str, distance: f64) -> Result<(), RoutingError> {
        if !self.contains(a) {
            return Err(RoutingError::UnknownLocation(a.to_string()));
        }
        if !self.contains(b) {
            return Err(RoutingError::UnknownLocation(b.to_string()));
        }
        if !(distance >= 0.0) || !distance.is_finite() {
            return Err(RoutingError::InvalidGraph(format!(
                "edge {} - {} has weight {}",
                a, b, distance
            )));
        }
        if a == b {
            return Ok(());
        }
        self.insert_half(a, b, distance);
        self.insert_half(b, a, distance);
        Ok(())
    }

    fn insert_half(&mut self, from: &str, to: &str, distance: f64) {
        let edges = self.adjacency.entry(from.to_string()).or_default();
        edges.retain(|(neighbour, _)| neighbour != to);
        let at = edges.partition_point(|(_, w)| *w <= distance);
        edges.insert(at, (to.to_string(), distance));
    }

    pub fn contains(&self, address: &str) -> bool {
        self.locations.contains_key(address)
    }

    pub fn location(&self, address: &str) -> Option<&Location> {
        self.locations.get(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn neighbours(&self, address: &str) -> Result<&[(String, f64)], RoutingError> {
        self.adjacency
            .get(address)
            .map(Vec::as_slice)
            .ok_or_else(|| RoutingError::UnknownLocation(address.to_string()))
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<f64> {
        self.adjacency
            .get(a)?
            .iter()
            .find(|(neighbour, _)| neighbour == b)
            .map(|(_, w)| *w)
    }

    /// Checks that every pair is directly connected with the same weight both ways.
    pub fn validate(&self) -> Result<(), RoutingError> {
        for (source, edges) in &self.adjacency {
            if edges.len() + 1 != self.locations.len() {
                return Err(RoutingError::InvalidGraph(format!(
                    "{} has {} neighbours, expected {}",
                    source,
                    edges.len(),
                    self.locations.len() - 1
                )));
            }
            for (target, weight) in edges {
                match self.edge(target, source) {
                    Some(back) if back == *weight => {}
                    _ => {
                        return Err(RoutingError::InvalidGraph(format!(
                            "edge {} - {} is not symmetric",
                            source, target
                        )))
                    }
                }
            }
        }
        debug!("Graph with {} locations validated", self.locations.len());
        Ok(())
    }
}
