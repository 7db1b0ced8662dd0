//! Routing Engine — Kruskal spanning forest + BFS path queries
//!
//! `load` replaces all state. Edges are stable-sorted by weight, so equal
//! weights are accepted in input order; callers that reorder equal-weight
//! edges may get a different (equally minimal) forest.
//!
//! Path queries walk the spanning forest only, never the full graph.

use super::topology::{City, Edge, LoadSummary, RouteInfo, TopologyStatus};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info};

/// Routing error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("Topology not loaded")]
    TopologyNotLoaded,
    #[error("Unknown cities: {0:?}")]
    UnknownCity(Vec<String>),
    #[error("No path from {from} to {to} (spanning edges: {mst_edge_count})")]
    Unreachable {
        from: String,
        to: String,
        mst_edge_count: usize,
    },
    #[error("Edge {index} references city {endpoint} but only {city_count} cities are loaded")]
    InvalidEdge {
        index: usize,
        endpoint: usize,
        city_count: usize,
    },
    #[error("Edge {index} has invalid weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("Duplicate city name: {0}")]
    DuplicateCity(String),
}

/// Disjoint-set forest with path compression and union by rank
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Compress
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`. Returns false if already joined.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.rank[ra] < self.rank[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        if self.rank[ra] == self.rank[rb] {
            self.rank[ra] += 1;
        }
        true
    }
}

/// The tree routing engine
#[derive(Debug, Default)]
pub struct RoutingEngine {
    cities: Vec<City>,
    edges: Vec<Edge>,
    city_to_index: HashMap<String, usize>,
    /// Full adjacency (diagnostics only; never used for routing)
    adjacency: Vec<Vec<(usize, f64)>>,
    mst_edges: Vec<Edge>,
    mst_adjacency: Vec<Vec<(usize, f64)>>,
}

impl RoutingEngine {
    /// Create an engine with no topology loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the topology and recompute the spanning forest.
    ///
    /// On a validation error the previous topology is left untouched.
    pub fn load(&mut self, cities: Vec<City>, edges: Vec<Edge>) -> Result<LoadSummary, RouteError> {
        let city_count = cities.len();

        let mut city_to_index = HashMap::with_capacity(city_count);
        for (i, city) in cities.iter().enumerate() {
            if city_to_index.insert(city.name.clone(), i).is_some() {
                return Err(RouteError::DuplicateCity(city.name.clone()));
            }
        }

        for (index, edge) in edges.iter().enumerate() {
            for endpoint in [edge.u, edge.v] {
                if endpoint >= city_count {
                    return Err(RouteError::InvalidEdge {
                        index,
                        endpoint,
                        city_count,
                    });
                }
            }
            if !edge.w.is_finite() || edge.w < 0.0 {
                return Err(RouteError::InvalidWeight {
                    index,
                    weight: edge.w,
                });
            }
        }

        let mut adjacency = vec![Vec::new(); city_count];
        for edge in &edges {
            adjacency[edge.u].push((edge.v, edge.w));
            adjacency[edge.v].push((edge.u, edge.w));
        }

        let mst_edges = kruskal(city_count, &edges);

        let mut mst_adjacency = vec![Vec::new(); city_count];
        for edge in &mst_edges {
            mst_adjacency[edge.u].push((edge.v, edge.w));
            mst_adjacency[edge.v].push((edge.u, edge.w));
        }

        info!(
            "Topology loaded: {} cities, {} edges, {} spanning edges",
            city_count,
            edges.len(),
            mst_edges.len()
        );

        self.cities = cities;
        self.edges = edges;
        self.city_to_index = city_to_index;
        self.adjacency = adjacency;
        self.mst_edges = mst_edges;
        self.mst_adjacency = mst_adjacency;

        Ok(LoadSummary {
            city_count,
            edge_count: self.edges.len(),
            mst_edge_count: self.mst_edges.len(),
        })
    }

    /// Path from `source` to `target` inclusive, or empty if there is none.
    ///
    /// Unknown cities and cities in different components both yield an
    /// empty path.
    pub fn route(&self, source: &str, target: &str) -> Vec<String> {
        let (Some(&src), Some(&dst)) = (
            self.city_to_index.get(source),
            self.city_to_index.get(target),
        ) else {
            return Vec::new();
        };

        if src == dst {
            return vec![self.cities[src].name.clone()];
        }

        let mut came_from: Vec<Option<usize>> = vec![None; self.cities.len()];
        let mut visited = vec![false; self.cities.len()];
        let mut queue = VecDeque::new();
        visited[src] = true;
        queue.push_back(src);

        while let Some(current) = queue.pop_front() {
            for &(neighbor, _) in &self.mst_adjacency[current] {
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                came_from[neighbor] = Some(current);
                if neighbor == dst {
                    return self.unwind(&came_from, dst);
                }
                queue.push_back(neighbor);
            }
        }

        debug!("No spanning path between {} and {}", source, target);
        Vec::new()
    }

    fn unwind(&self, came_from: &[Option<usize>], dst: usize) -> Vec<String> {
        let mut path = vec![dst];
        let mut node = dst;
        while let Some(prev) = came_from[node] {
            path.push(prev);
            node = prev;
        }
        path.iter()
            .rev()
            .map(|&i| self.cities[i].name.clone())
            .collect()
    }

    /// True iff a route exists between the two cities
    pub fn is_connected(&self, a: &str, b: &str) -> bool {
        !self.route(a, b).is_empty()
    }

    /// Cities strictly between the endpoints of the route
    pub fn intermediate_cities(&self, source: &str, target: &str) -> Vec<String> {
        let route = self.route(source, target);
        if route.len() <= 2 {
            return Vec::new();
        }
        route[1..route.len() - 1].to_vec()
    }

    /// Typed route query distinguishing why no route was found
    pub fn query_route(&self, source: &str, target: &str) -> Result<RouteInfo, RouteError> {
        if self.cities.is_empty() {
            return Err(RouteError::TopologyNotLoaded);
        }

        let missing: Vec<String> = [source, target]
            .iter()
            .filter(|name| !self.city_to_index.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RouteError::UnknownCity(missing));
        }

        let route = self.route(source, target);
        if route.is_empty() {
            return Err(RouteError::Unreachable {
                from: source.to_string(),
                to: target.to_string(),
                mst_edge_count: self.mst_edges.len(),
            });
        }

        Ok(RouteInfo::new(source, target, route))
    }

    pub fn status(&self) -> TopologyStatus {
        let (mst_edge_count, mst_edges) = if self.cities.is_empty() || self.edges.is_empty() {
            (0, Vec::new())
        } else {
            (self.mst_edges.len(), self.mst_edges.clone())
        };

        TopologyStatus {
            city_count: self.cities.len(),
            edge_count: self.edges.len(),
            mst_edge_count,
            mst_edges,
            city_names: self.cities.iter().map(|c| c.name.clone()).collect(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.cities.is_empty()
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.city_to_index.contains_key(name)
    }

    /// Full-graph neighbours of a city (diagnostics)
    pub fn neighbors(&self, name: &str) -> Vec<(String, f64)> {
        self.city_to_index
            .get(name)
            .map(|&i| {
                self.adjacency[i]
                    .iter()
                    .map(|&(j, w)| (self.cities[j].name.clone(), w))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn mst_edges(&self) -> &[Edge] {
        &self.mst_edges
    }
}

/// Kruskal over a stable weight sort; stops at `n - 1` accepted edges.
fn kruskal(city_count: usize, edges: &[Edge]) -> Vec<Edge> {
    if city_count == 0 || edges.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<Edge> = edges.to_vec();
    sorted.sort_by(|a, b| a.w.total_cmp(&b.w));

    let target = city_count - 1;
    let mut sets = UnionFind::new(city_count);
    let mut accepted = Vec::with_capacity(target);

    for edge in sorted {
        if accepted.len() == target {
            break;
        }
        if sets.union(edge.u, edge.v) {
            accepted.push(edge);
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cities(names: &[&str]) -> Vec<City> {
        names.iter().map(|n| City::named(*n)).collect()
    }

    fn triangle() -> RoutingEngine {
        let mut engine = RoutingEngine::new();
        engine
            .load(
                cities(&["A", "B", "C"]),
                vec![Edge::new(0, 1, 1.0), Edge::new(1, 2, 2.0), Edge::new(0, 2, 5.0)],
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_triangle_mst() {
        let engine = triangle();
        let mst = engine.mst_edges();
        assert_eq!(mst.len(), 2);
        assert_eq!(mst[0], Edge::new(0, 1, 1.0));
        assert_eq!(mst[1], Edge::new(1, 2, 2.0));
        assert_eq!(engine.route("A", "C"), vec!["A", "B", "C"]);
        assert_eq!(engine.route("C", "A"), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_route_to_self() {
        let engine = triangle();
        assert_eq!(engine.route("B", "B"), vec!["B"]);
    }

    #[test]
    fn test_unknown_city_yields_empty() {
        let engine = triangle();
        assert!(engine.route("A", "Z").is_empty());
        assert!(engine.route("Z", "Z").is_empty());
        assert!(!engine.is_connected("A", "Z"));
    }

    #[test]
    fn test_forest_has_no_cross_component_route() {
        let mut engine = RoutingEngine::new();
        let summary = engine
            .load(
                cities(&["A", "B", "C", "D"]),
                vec![Edge::new(0, 1, 1.0), Edge::new(2, 3, 1.0)],
            )
            .unwrap();
        assert_eq!(summary.mst_edge_count, 2);
        assert!(engine.route("A", "D").is_empty());
        assert_eq!(engine.route("C", "D"), vec!["C", "D"]);
        assert!(matches!(
            engine.query_route("A", "D"),
            Err(RouteError::Unreachable { mst_edge_count: 2, .. })
        ));
    }

    #[test]
    fn test_equal_weights_follow_input_order() {
        let mut engine = RoutingEngine::new();
        engine
            .load(
                cities(&["A", "B", "C"]),
                vec![Edge::new(0, 2, 1.0), Edge::new(0, 1, 1.0), Edge::new(1, 2, 1.0)],
            )
            .unwrap();
        assert_eq!(engine.mst_edges(), &[Edge::new(0, 2, 1.0), Edge::new(0, 1, 1.0)]);
        assert_eq!(engine.route("B", "C"), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_intermediate_cities() {
        let engine = triangle();
        assert_eq!(engine.intermediate_cities("A", "C"), vec!["B"]);
        assert!(engine.intermediate_cities("A", "B").is_empty());
        assert!(engine.intermediate_cities("A", "A").is_empty());
    }

    #[test]
    fn test_query_route_errors() {
        let empty = RoutingEngine::new();
        assert_eq!(empty.query_route("A", "B"), Err(RouteError::TopologyNotLoaded));

        let engine = triangle();
        assert_eq!(
            engine.query_route("A", "Nowhere"),
            Err(RouteError::UnknownCity(vec!["Nowhere".to_string()]))
        );
        let info = engine.query_route("A", "C").unwrap();
        assert_eq!(info.hops, 2);
    }

    #[test]
    fn test_invalid_load_keeps_previous_topology() {
        let mut engine = triangle();

        let err = engine
            .load(cities(&["X", "Y"]), vec![Edge::new(0, 5, 1.0)])
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidEdge { endpoint: 5, .. }));

        let err = engine
            .load(cities(&["X", "Y"]), vec![Edge::new(0, 1, -1.0)])
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidWeight { .. }));

        let err = engine.load(cities(&["X", "X"]), vec![]).unwrap_err();
        assert_eq!(err, RouteError::DuplicateCity("X".to_string()));

        assert_eq!(engine.route("A", "C"), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_status_without_edges_reports_zero_mst() {
        let mut engine = RoutingEngine::new();
        engine.load(cities(&["A", "B"]), vec![]).unwrap();
        let status = engine.status();
        assert_eq!(status.city_count, 2);
        assert_eq!(status.edge_count, 0);
        assert_eq!(status.mst_edge_count, 0);
        assert_eq!(status.city_names, vec!["A", "B"]);
    }

    #[test]
    fn test_reload_replaces_topology() {
        let mut engine = triangle();
        engine
            .load(cities(&["P", "Q"]), vec![Edge::new(0, 1, 3.0)])
            .unwrap();
        assert!(!engine.contains("A"));
        assert_eq!(engine.route("P", "Q"), vec!["P", "Q"]);
        assert_eq!(engine.neighbors("P"), vec![("Q".to_string(), 3.0)]);
    }

    #[test]
    fn test_stops_at_n_minus_one_edges() {
        let mut engine = RoutingEngine::new();
        let summary = engine
            .load(
                cities(&["A", "B"]),
                vec![Edge::new(0, 1, 1.0), Edge::new(1, 0, 2.0), Edge::new(0, 0, 0.5)],
            )
            .unwrap();
        assert_eq!(summary.mst_edge_count, 1);
        assert_eq!(engine.mst_edges(), &[Edge::new(0, 1, 1.0)]);
    }
}
