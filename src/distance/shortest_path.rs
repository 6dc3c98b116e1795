use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::OnceLock;

use tracing::trace;

use crate::distance::graph::LocationGraph;
use crate::error::RoutingError;
use crate::utils::round_to;

/// Ordered hops from the source, each with its cumulative distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub hops: Vec<(String, f64)>,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Frontier {
    distance: f64,
    address: String,
}

impl Eq for Frontier {}

// Order by ascending distance so the max-heap pops the nearest location first.
impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.address.cmp(&self.address))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-source shortest paths (Dijkstra) from one location.
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    source: String,
    table: BTreeMap<String, (f64, Option<String>)>,
    paths: BTreeMap<String, OnceLock<Path>>,
}

impl ShortestPaths {
    /// Label-setting Dijkstra. Distances are rounded to `precision` decimals on every relaxation.
    pub fn compute(graph: &LocationGraph, source: &str, precision: u32) -> Result<Self, RoutingError> {
        if !graph.contains(source) {
            return Err(RoutingError::UnknownLocation(source.to_string()));
        }

        let mut table: BTreeMap<String, (f64, Option<String>)> = BTreeMap::new();
        let mut frontier = BinaryHeap::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();

        table.insert(source.to_string(), (0.0, None));
        for (neighbour, weight) in graph.neighbours(source)? {
            table.insert(neighbour.clone(), (*weight, Some(source.to_string())));
            frontier.push(Frontier {
                distance: *weight,
                address: neighbour.clone(),
            });
        }
        visited.insert(source.to_string());

        while let Some(Frontier { distance, address }) = frontier.pop() {
            if visited.contains(&address) {
                continue;
            }
            // stale entry left behind by a later improvement
            if table.get(&address).is_some_and(|(best, _)| distance > *best) {
                continue;
            }

            for (neighbour, weight) in graph.neighbours(&address)? {
                if visited.contains(neighbour) {
                    continue;
                }
                let candidate = distance + weight;
                let known = table.get(neighbour).map_or(f64::INFINITY, |(d, _)| *d);
                if candidate < known {
                    let rounded = round_to(candidate, precision);
                    trace!("{} -> {} improved to {} via {}", source, neighbour, rounded, address);
                    table.insert(neighbour.clone(), (rounded, Some(address.clone())));
                    frontier.push(Frontier {
                        distance: rounded,
                        address: neighbour.clone(),
                    });
                }
            }
            visited.insert(address);
        }

        let paths = table.keys().map(|target| (target.clone(), OnceLock::new())).collect();
        Ok(ShortestPaths {
            source: source.to_string(),
            table,
            paths,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn distance_to(&self, target: &str) -> Option<f64> {
        self.table.get(target).map(|(d, _)| *d)
    }

    pub fn predecessor(&self, target: &str) -> Option<&str> {
        self.table.get(target)?.1.as_deref()
    }

    /// Full route to `target`, reconstructed once and cached.
    pub fn path_to(&self, target: &str) -> Result<&Path, RoutingError> {
        let slot = self
            .paths
            .get(target)
            .ok_or_else(|| RoutingError::UnknownLocation(target.to_string()))?;
        Ok(slot.get_or_init(|| self.reconstruct(target)))
    }

    fn reconstruct(&self, target: &str) -> Path {
        let mut hops = vec![];
        let mut current = Some(target);
        while let Some(address) = current {
            let (distance, previous) = &self.table[address];
            hops.push((address.to_string(), *distance));
            current = previous.as_deref();
        }
        hops.reverse();
        Path {
            distance: self.table[target].0,
            hops,
        }
    }

    /// Nearest candidate by shortest-path distance; ties keep the earlier candidate.
    pub fn closest_unvisited<'a, I>(&self, candidates: I) -> Option<(&'a str, f64)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f64)> = None;
        for candidate in candidates {
            let Some(distance) = self.distance_to(candidate) else {
                continue;
            };
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((candidate, distance));
            }
        }
        best
    }

    pub fn max_distance(&self) -> f64 {
        self.table.values().map(|(d, _)| *d).fold(0.0, f64::max)
    }

    pub fn reachable(&self) -> usize {
        self.table.len()
    }

    pub fn distances(&self) -> impl Iterator<Item = (&str, f64)> {
        self.table.iter().map(|(address, (d, _))| (address.as_str(), *d))
    }
}
