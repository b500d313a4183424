//! Drive the agent along a route by streaming position updates
//!
//! Every edge is walked in `steps_per_edge` increments starting at fraction
//! 0.0, with a movement pause after each update. Arrival is reported once,
//! as fraction 1.0 on the final edge.

use super::client::DispatchClient;
use super::shutdown::ShutdownSignal;
use super::state::AgentRecord;
use super::timing::{pause, Sleeper};
use crate::config::AgentProfile;
use crate::error::AgentResult;
use crate::leg_span;
use crate::pathfinding::Route;
use crate::transport::Transport;
use std::time::Duration;
use tracing::{debug, info, Instrument};

/// How a navigation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Completed,
    Interrupted,
}

/// Movement pacing for one run
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub steps_per_edge: u32,
    pub movement_step: Duration,
}

impl From<&AgentProfile> for Pacing {
    fn from(profile: &AgentProfile) -> Self {
        Self {
            steps_per_edge: profile.steps_per_edge.max(1),
            movement_step: profile.movement_step(),
        }
    }
}

/// Walks routes on behalf of one client
pub struct Navigator<'a, T: Transport> {
    client: &'a DispatchClient<T>,
    sleeper: &'a dyn Sleeper,
    shutdown: &'a ShutdownSignal,
    pacing: Pacing,
}

impl<'a, T: Transport> Navigator<'a, T> {
    pub fn new(
        client: &'a DispatchClient<T>,
        sleeper: &'a dyn Sleeper,
        shutdown: &'a ShutdownSignal,
        pacing: Pacing,
    ) -> Self {
        Self {
            client,
            sleeper,
            shutdown,
            pacing,
        }
    }

    /// Walk `route`, updating `record` as the agent moves
    ///
    /// Any rejected or failed position update aborts the run with an error.
    pub async fn drive(&self, route: &Route, record: &mut AgentRecord) -> AgentResult<NavigationOutcome> {
        let span = leg_span!(
            agent = %self.client.name(),
            from = route.source(),
            to = route.destination(),
            edges = route.edge_count()
        );
        self.walk(route, record).instrument(span).await
    }

    async fn walk(&self, route: &Route, record: &mut AgentRecord) -> AgentResult<NavigationOutcome> {
        record.current_route = Some(route.clone());

        if route.edge_count() == 0 {
            let node = route.source();
            self.report(record, node, node, 1.0).await?;
            record.arrive(node);
            debug!(node, "Already at destination");
            return Ok(NavigationOutcome::Completed);
        }

        let steps = self.pacing.steps_per_edge;
        let mut last_edge = (route.source(), route.source());

        for (start, end) in route.edges() {
            for step in 0..steps {
                if self.shutdown.is_triggered() {
                    return Ok(NavigationOutcome::Interrupted);
                }
                let fraction = step as f32 / steps as f32;
                self.report(record, start, end, fraction).await?;
                if !pause(self.sleeper, self.shutdown, self.pacing.movement_step).await {
                    return Ok(NavigationOutcome::Interrupted);
                }
            }
            last_edge = (start, end);
        }

        if self.shutdown.is_triggered() {
            return Ok(NavigationOutcome::Interrupted);
        }
        let (start, end) = last_edge;
        self.report(record, start, end, 1.0).await?;
        record.arrive(end);
        info!(node = end, route = %route, "Arrived");

        Ok(NavigationOutcome::Completed)
    }

    async fn report(&self, record: &mut AgentRecord, start: u32, end: u32, fraction: f32) -> AgentResult<()> {
        self.client.send_position(start, end, fraction).await?;
        record.set_progress(start, end, fraction);
        Ok(())
    }
}
