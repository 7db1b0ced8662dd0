// Topology data model — cities, weighted edges, and status snapshots

use serde::{Deserialize, Serialize};

/// A named endpoint. Coordinates are carried for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// Unique city identity
    pub name: String,
    /// Longitude
    #[serde(default)]
    pub lng: f64,
    /// Latitude
    #[serde(default)]
    pub lat: f64,
}

impl City {
    /// Create a city with zeroed coordinates
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lng: 0.0,
            lat: 0.0,
        }
    }
}

/// An undirected weighted edge between two city indices.
///
/// Indices refer to positions in the city list of the same load call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub u: usize,
    pub v: usize,
    pub w: f64,
}

impl Edge {
    pub fn new(u: usize, v: usize, w: f64) -> Self {
        Self { u, v, w }
    }
}

/// Result of a successful topology load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub city_count: usize,
    pub edge_count: usize,
    pub mst_edge_count: usize,
}

/// Snapshot of the loaded topology
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologyStatus {
    pub city_count: usize,
    pub edge_count: usize,
    pub mst_edge_count: usize,
    /// Accepted spanning-forest edges, in acceptance order
    pub mst_edges: Vec<Edge>,
    pub city_names: Vec<String>,
}

/// A resolved route between two cities
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub from: String,
    pub to: String,
    /// Cities from source to destination inclusive
    pub route: Vec<String>,
    pub hops: usize,
}

impl RouteInfo {
    pub fn new(from: &str, to: &str, route: Vec<String>) -> Self {
        let hops = route.len().saturating_sub(1);
        Self {
            from: from.to_string(),
            to: to.to_string(),
            route,
            hops,
        }
    }
}
