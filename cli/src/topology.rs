// Topology file loading
//
// Format: {"cities":[{"name","lng","lat"}],"edges":[{"u","v","w"}]}
// Edge endpoints are indices into `cities`.

use anyhow::{Context, Result};
use citynet_core::{City, Edge};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyFile {
    pub cities: Vec<City>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl TopologyFile {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse topology file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }
}
