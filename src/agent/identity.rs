//! Agent name and display color

use crate::config::AgentSection;
use crate::protocol::{Color, NAME_WIDTH};
use uuid::Uuid;

/// How the agent presents itself to the dispatch server
#[derive(Debug, Clone, PartialEq)]
pub struct AgentIdentity {
    pub name: String,
    pub color: Color,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }

    /// Random name and color
    pub fn random() -> Self {
        let id = Uuid::new_v4();
        let bytes = id.as_bytes();
        let color = Color::new(
            bytes[0] as f32 / 255.0,
            bytes[1] as f32 / 255.0,
            bytes[2] as f32 / 255.0,
        );
        let name = format!("agent-{}", &id.simple().to_string()[..8]);
        Self { name, color }
    }

    /// Use configured values where present, random ones otherwise
    pub fn from_config(section: &AgentSection) -> Self {
        let random = Self::random();
        Self {
            name: section.name.clone().unwrap_or(random.name),
            color: section.color.map(Color::from).unwrap_or(random.color),
        }
    }

    /// Whether the name survives the fixed-width wire field intact
    pub fn fits_on_wire(&self) -> bool {
        self.name.is_ascii() && self.name.len() <= NAME_WIDTH
    }
}
