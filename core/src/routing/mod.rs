//! Tree Routing — minimum-spanning-tree topology over named cities
//!
//! A topology is loaded wholesale (cities + weighted edges), reduced to its
//! minimum spanning forest with Kruskal's algorithm, and then answers path
//! queries over the forest only. Between two connected cities there is exactly
//! one simple tree path; cities in different components have no route.

pub mod engine;
pub mod topology;

pub use engine::{RouteError, RoutingEngine};
pub use topology::{City, Edge, LoadSummary, RouteInfo, TopologyStatus};
