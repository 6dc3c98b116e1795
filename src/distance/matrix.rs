use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::info;

use crate::distance::graph::LocationGraph;
use crate::distance::shortest_path::ShortestPaths;
use crate::error::RoutingError;

/// All-pairs shortest paths: one Dijkstra run per location. Read-only once built.
#[derive(Debug, Clone)]
pub struct ShortestPathTable {
    by_source: BTreeMap<String, ShortestPaths>,
}

impl ShortestPathTable {
    pub fn build(graph: &LocationGraph, precision: u32) -> Result<Self, RoutingError> {
        info!("Precomputing shortest paths for {} locations", graph.len());

        let sources: Vec<&str> = graph.addresses().collect();
        // Sources are independent of each other
        let computed: Vec<ShortestPaths> = sources
            .par_iter()
            .map(|source| ShortestPaths::compute(graph, source, precision))
            .collect::<Result<_, _>>()?;

        let by_source = computed
            .into_iter()
            .map(|paths| (paths.source().to_string(), paths))
            .collect();
        Ok(ShortestPathTable { by_source })
    }

    pub fn from(&self, source: &str) -> Result<&ShortestPaths, RoutingError> {
        self.by_source
            .get(source)
            .ok_or_else(|| RoutingError::UnknownLocation(source.to_string()))
    }

    pub fn distance(&self, from: &str, to: &str) -> Result<f64, RoutingError> {
        self.from(from)?
            .distance_to(to)
            .ok_or_else(|| RoutingError::UnknownLocation(to.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::data_generator::random_complete_graph;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn symmetric_with_zero_diagonal() {
        let graph = random_complete_graph(9, 7).unwrap();
        let table = ShortestPathTable::build(&graph, 1).unwrap();
        let addresses: Vec<&str> = graph.addresses().collect();
        for a in &addresses {
            assert_eq!(table.distance(a, a).unwrap(), 0.0);
            for b in &addresses {
                let ab = table.distance(a, b).unwrap();
                let ba = table.distance(b, a).unwrap();
                assert!((ab - ba).abs() < EPSILON, "{} -> {}: {} vs {}", a, b, ab, ba);
            }
        }
    }

    #[test]
    fn triangle_inequality_holds() {
        for seed in [1, 2, 3] {
            let graph = random_complete_graph(8, seed).unwrap();
            let table = ShortestPathTable::build(&graph, 1).unwrap();
            let addresses: Vec<&str> = graph.addresses().collect();
            for a in &addresses {
                for b in &addresses {
                    for c in &addresses {
                        let direct = table.distance(a, c).unwrap();
                        let via = table.distance(a, b).unwrap() + table.distance(b, c).unwrap();
                        assert!(direct <= via + EPSILON);
                    }
                }
            }
        }
    }

    #[test]
    fn recomputing_a_source_is_idempotent() {
        let graph = random_complete_graph(10, 11).unwrap();
        let first = ShortestPaths::compute(&graph, "HUB", 1).unwrap();
        let second = ShortestPaths::compute(&graph, "HUB", 1).unwrap();
        let a: Vec<(&str, f64)> = first.distances().collect();
        let b: Vec<(&str, f64)> = second.distances().collect();
        assert_eq!(a, b);

        let table = ShortestPathTable::build(&graph, 1).unwrap();
        let c: Vec<(&str, f64)> = table.from("HUB").unwrap().distances().collect();
        assert_eq!(a, c);
    }

    #[test]
    fn unknown_lookups_fail() {
        let table = ShortestPathTable::build(&random_complete_graph(4, 5).unwrap(), 1).unwrap();
        assert!(table.from("Nowhere").is_err());
        assert!(table.distance("HUB", "Nowhere").is_err());
        assert_eq!(table.len(), 4);
    }
}
