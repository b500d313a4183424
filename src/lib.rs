//! courier-agent
//!
//! A simulated field agent for a central dispatch server. The agent
//! registers over TCP, receives a weighted graph map, polls for delivery
//! tasks and walks each route by streaming interpolated position updates.
//!
//! # Overview
//!
//! - [`protocol`]: fixed-layout binary wire format, versioned schema table
//! - [`map`]: navigation graph and its text format
//! - [`pathfinding`]: A* route planning
//! - [`transport`]: one TCP connection per request
//! - [`agent`]: dispatch client, navigation and lifecycle state machine
//! - [`config`], [`observability`]: TOML configuration, logging and metrics
//! - [`testing`]: mocks and an in-process dispatch server
//!
//! # Quick Start
//!
//! ```rust
//! use courier_agent::map::parse_map;
//! use courier_agent::pathfinding::find_path;
//!
//! let text = "0 0 0 0\n3\n0 0 0 0\n1 1\n1 1 0 0\n0 1 2 1\n2 2 0 0\n1 1\n";
//! let parsed = parse_map(text).unwrap();
//! let hq = parsed.map.hq().graph_index;
//!
//! let route = find_path(&parsed.map, 2, hq).unwrap();
//! assert_eq!(route.nodes(), &[2, 1, 0]);
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod map;
pub mod observability;
pub mod pathfinding;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use error::{AgentError, AgentResult};
