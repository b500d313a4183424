//! Agent states and the per-session agent record

use super::identity::AgentIdentity;
use crate::pathfinding::Route;
use crate::protocol::{Color, TaskAssignment, STATUS_WIDTH};
use std::fmt;

/// Lifecycle state
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    Unregistered,
    Registering,
    Idle,
    NavigatingHome,
    AwaitingTask,
    Loading(TaskAssignment),
    Delivering(TaskAssignment),
    HandingOff(TaskAssignment),
    ReturningHome,
    Deregistered,
    Failed(String),
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            AgentState::Unregistered => "unregistered",
            AgentState::Registering => "registering",
            AgentState::Idle => "idle",
            AgentState::NavigatingHome => "navigating_home",
            AgentState::AwaitingTask => "awaiting_task",
            AgentState::Loading(_) => "loading",
            AgentState::Delivering(_) => "delivering",
            AgentState::HandingOff(_) => "handing_off",
            AgentState::ReturningHome => "returning_home",
            AgentState::Deregistered => "deregistered",
            AgentState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Deregistered | AgentState::Failed(_))
    }

    /// True once the server knows about this agent
    pub fn is_registered(&self) -> bool {
        !matches!(
            self,
            AgentState::Unregistered
                | AgentState::Registering
                | AgentState::Deregistered
                | AgentState::Failed(_)
        )
    }

    /// Task being worked on, if any
    pub fn task(&self) -> Option<&TaskAssignment> {
        match self {
            AgentState::Loading(task) | AgentState::Delivering(task) | AgentState::HandingOff(task) => {
                Some(task)
            }
            _ => None,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.task() {
            Some(task) => write!(f, "{} ({})", self.name(), task.name),
            None => f.write_str(self.name()),
        }
    }
}

/// What the agent knows about itself during a session
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub preferred_name: String,
    pub color: Color,
    /// Last status announced (or, on the legacy protocol, recorded locally),
    /// cut to the wire width
    pub status_message: String,
    /// Node the agent last arrived at
    pub location: Option<u32>,
    pub current_route: Option<Route>,
    /// Edge currently being traversed
    pub current_edge: Option<(u32, u32)>,
    pub position_within_edge: f32,
}

impl AgentRecord {
    pub fn new(identity: &AgentIdentity) -> Self {
        Self {
            preferred_name: identity.name.clone(),
            color: identity.color,
            status_message: String::new(),
            location: None,
            current_route: None,
            current_edge: None,
            position_within_edge: 0.0,
        }
    }

    /// Store `status` as the server receives it: ASCII, at most
    /// `STATUS_WIDTH` characters
    pub fn set_status(&mut self, status: &str) {
        let wire: String = status
            .chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .take(STATUS_WIDTH)
            .collect();
        self.status_message = wire.trim_end_matches([' ', '\0']).to_string();
    }

    pub fn set_progress(&mut self, start: u32, end: u32, fraction: f32) {
        self.current_edge = Some((start, end));
        self.position_within_edge = fraction;
    }

    /// Record arrival at `node` and clear the route
    pub fn arrive(&mut self, node: u32) {
        self.location = Some(node);
        self.current_route = None;
        self.current_edge = None;
        self.position_within_edge = 0.0;
    }
}
