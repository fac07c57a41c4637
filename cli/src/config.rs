// Configuration management for the dsdv-mesh CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/dsdv-mesh/config.json
// - Linux: ~/.config/dsdv-mesh/config.json
// - Windows: %APPDATA%\dsdv-mesh\config.json

use anyhow::{Context, Result};
use clap::ValueEnum;
use dsdv_mesh_core::NodeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How simulated nodes are linked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Each node hears only its predecessor and successor
    Line,
    /// A line whose ends are linked
    Ring,
    /// Every node hears every other node
    Full,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Line => write!(f, "line"),
            Topology::Ring => write!(f, "ring"),
            Topology::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Protocol constants applied to every simulated node
    pub node: NodeConfig,

    /// Simulation defaults, overridable on the command line
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub nodes: usize,
    pub topology: Topology,
    pub periods: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                broadcast_period_ms: 1000,
                ..NodeConfig::default()
            },
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: 4,
            topology: Topology::Line,
            periods: 5,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("dsdv-mesh");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value, rejecting combinations the node would refuse
    ///
    /// The caller persists the result.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "table_capacity" => {
                updated.node.table_capacity = value.parse().context("Invalid number")?;
            }
            "broadcast_period_ms" => {
                updated.node.broadcast_period_ms = value.parse().context("Invalid number")?;
            }
            "max_datagram_size" => {
                updated.node.max_datagram_size = value.parse().context("Invalid number")?;
            }
            "event_queue_capacity" => {
                updated.node.event_queue_capacity = value.parse().context("Invalid number")?;
            }
            "command_queue_capacity" => {
                updated.node.command_queue_capacity = value.parse().context("Invalid number")?;
            }
            "notification_queue_capacity" => {
                updated.node.notification_queue_capacity =
                    value.parse().context("Invalid number")?;
            }
            "nodes" => {
                updated.simulation.nodes = value.parse().context("Invalid number")?;
            }
            "topology" => {
                updated.simulation.topology = Topology::from_str(value, true)
                    .map_err(|_| anyhow::anyhow!("Invalid topology: {}", value))?;
            }
            "periods" => {
                updated.simulation.periods = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        updated
            .node
            .validate()
            .with_context(|| format!("Rejected {} = {}", key, value))?;
        *self = updated;
        Ok(())
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("table_capacity".to_string(), self.node.table_capacity.to_string()),
            (
                "broadcast_period_ms".to_string(),
                self.node.broadcast_period_ms.to_string(),
            ),
            (
                "max_datagram_size".to_string(),
                self.node.max_datagram_size.to_string(),
            ),
            (
                "event_queue_capacity".to_string(),
                self.node.event_queue_capacity.to_string(),
            ),
            (
                "command_queue_capacity".to_string(),
                self.node.command_queue_capacity.to_string(),
            ),
            (
                "notification_queue_capacity".to_string(),
                self.node.notification_queue_capacity.to_string(),
            ),
            ("nodes".to_string(), self.simulation.nodes.to_string()),
            ("topology".to_string(), self.simulation.topology.to_string()),
            ("periods".to_string(), self.simulation.periods.to_string()),
        ]
    }
}
