//! Agent lifecycle state machine
//!
//! ```text
//! Unregistered -> Registering -> Idle -> NavigatingHome -> AwaitingTask
//! AwaitingTask -> Loading -> Delivering -> HandingOff -> ReturningHome -> AwaitingTask
//! any registered state -> Deregistered (shutdown) | Failed (fatal error)
//! ```
//!
//! [`AgentLifecycle::step`] performs the work of exactly one state and moves
//! to the next; [`AgentLifecycle::run`] loops until a terminal state. The
//! current state is published on a watch channel.

use super::client::{DispatchClient, TaskPoll};
use super::identity::AgentIdentity;
use super::navigation::{NavigationOutcome, Navigator, Pacing};
use super::shutdown::ShutdownSignal;
use super::state::{AgentRecord, AgentState};
use super::timing::{pause, Sleeper};
use crate::config::{AgentConfig, AgentProfile, ConfigError};
use crate::error::{AgentError, AgentResult};
use crate::map::{parse_map, Map};
use crate::observability::metrics;
use crate::pathfinding::{find_path, Route};
use crate::protocol::Codec;
use crate::session_span;
use crate::transport::Transport;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

/// Status announced whenever the agent is ready for work
pub const WAITING_FOR_TASK: &str = "waiting for task";
/// Status announced on the way back to HQ after a delivery
pub const RETURNING_TO_HQ: &str = "returning to HQ";

/// Timing knobs for one lifecycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleSettings {
    pub profile: AgentProfile,
    pub no_task_backoff: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            profile: config.profile()?,
            no_task_backoff: config.polling.no_task_backoff(),
        })
    }
}

/// Drives one agent session from registration to deregistration
pub struct AgentLifecycle<T: Transport, S: Sleeper> {
    client: DispatchClient<T>,
    sleeper: S,
    shutdown: ShutdownSignal,
    settings: LifecycleSettings,
    identity: AgentIdentity,
    record: AgentRecord,
    map: Option<Map>,
    state: AgentState,
    state_tx: watch::Sender<AgentState>,
}

impl<T: Transport, S: Sleeper> AgentLifecycle<T, S> {
    pub fn new(
        identity: AgentIdentity,
        transport: T,
        codec: Codec,
        sleeper: S,
        shutdown: ShutdownSignal,
        settings: LifecycleSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(AgentState::Unregistered);
        Self {
            client: DispatchClient::new(transport, codec, identity.name.clone()),
            sleeper,
            shutdown,
            settings,
            record: AgentRecord::new(&identity),
            identity,
            map: None,
            state: AgentState::Unregistered,
            state_tx,
        }
    }

    /// Watch the state as it changes
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn record(&self) -> &AgentRecord {
        &self.record
    }

    /// Map received at registration
    pub fn map(&self) -> Option<&Map> {
        self.map.as_ref()
    }

    pub fn client(&self) -> &DispatchClient<T> {
        &self.client
    }

    /// Run until shutdown or a fatal error and return the terminal state
    pub async fn run(&mut self) -> AgentState {
        let span = session_span!(
            agent = %self.identity.name,
            generation = %self.client.codec().generation()
        );
        self.run_loop().instrument(span).await;

        match serde_json::to_string(&metrics().snapshot()) {
            Ok(json) => info!(metrics = %json, "Agent stopped"),
            Err(e) => warn!(error = %e, "Could not serialize metrics snapshot"),
        }
        self.state.clone()
    }

    async fn run_loop(&mut self) {
        info!(profile = ?self.settings.profile, "Agent starting");
        while !self.state.is_terminal() {
            if self.shutdown.is_triggered() {
                self.stop().await;
                break;
            }
            match self.step().await {
                Ok(()) => {}
                Err(AgentError::Interrupted) => {
                    self.stop().await;
                    break;
                }
                Err(e) => {
                    self.fail(e).await;
                    break;
                }
            }
        }
    }

    /// Do the work of the current state and move to the next one
    pub async fn step(&mut self) -> AgentResult<()> {
        match self.state.clone() {
            AgentState::Unregistered => self.transition(AgentState::Registering),
            AgentState::Registering => {
                self.register().await?;
                self.transition(AgentState::Idle);
            }
            AgentState::Idle => self.transition(AgentState::NavigatingHome),
            AgentState::NavigatingHome => {
                let route = self.plan_to(self.hq()?)?;
                self.navigate(&route).await?;
                self.announce(WAITING_FOR_TASK).await;
                self.transition(AgentState::AwaitingTask);
            }
            AgentState::AwaitingTask => self.poll_for_task().await?,
            AgentState::Loading(task) => {
                self.hold().await?;
                self.announce(&format!("delivering {}", task.name)).await;
                self.transition(AgentState::Delivering(task));
            }
            AgentState::Delivering(task) => {
                let route = self.plan_to(task.destination)?;
                self.navigate(&route).await?;
                self.announce(&format!("handing off {}", task.name)).await;
                self.transition(AgentState::HandingOff(task));
            }
            AgentState::HandingOff(task) => {
                self.hold().await?;
                self.client.task_complete().await?;
                info!(task = %task.name, "Task complete");
                self.announce(RETURNING_TO_HQ).await;
                self.transition(AgentState::ReturningHome);
            }
            AgentState::ReturningHome => {
                let route = self.plan_to(self.hq()?)?;
                self.navigate(&route).await?;
                self.announce(WAITING_FOR_TASK).await;
                self.transition(AgentState::AwaitingTask);
            }
            AgentState::Deregistered | AgentState::Failed(_) => {}
        }
        Ok(())
    }

    async fn register(&mut self) -> AgentResult<()> {
        let payload = self.client.register(self.identity.color).await?;
        let parsed = parse_map(&payload.map_text)?;
        for warning in &parsed.warnings {
            warn!(%warning, "Map text inconsistency");
        }

        info!(
            graph_index = payload.graph_index,
            nodes = parsed.map.len(),
            hq = parsed.map.hq().graph_index,
            "Registered"
        );
        self.record.location = Some(payload.graph_index);
        self.map = Some(parsed.map);
        Ok(())
    }

    async fn poll_for_task(&mut self) -> AgentResult<()> {
        match self.client.request_task().await {
            Ok(TaskPoll::Assigned(task)) => {
                metrics().task_started();
                info!(task = %task.name, destination = task.destination, "Task assigned");
                self.announce(&format!("loading {}", task.name)).await;
                self.transition(AgentState::Loading(task));
            }
            Ok(TaskPoll::NoTasks) => {
                debug!(backoff = ?self.settings.no_task_backoff, "No tasks available");
                self.announce(WAITING_FOR_TASK).await;
                self.pause(self.settings.no_task_backoff).await?;
            }
            Err(e) if e.is_transport() => {
                warn!(error = %e, "Task poll failed, retrying");
                self.pause(self.settings.no_task_backoff).await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn hq(&self) -> AgentResult<u32> {
        self.map
            .as_ref()
            .map(|map| map.hq().graph_index)
            .ok_or_else(|| AgentError::internal_error("no map before registration"))
    }

    fn plan_to(&self, destination: u32) -> AgentResult<Route> {
        let map = self
            .map
            .as_ref()
            .ok_or_else(|| AgentError::internal_error("no map before registration"))?;
        let from = self
            .record
            .location
            .ok_or_else(|| AgentError::internal_error("agent location unknown"))?;
        let route = find_path(map, from, destination)?;
        debug!(%route, "Planned route");
        Ok(route)
    }

    async fn navigate(&mut self, route: &Route) -> AgentResult<()> {
        let navigator = Navigator::new(
            &self.client,
            &self.sleeper,
            &self.shutdown,
            Pacing::from(&self.settings.profile),
        );
        match navigator.drive(route, &mut self.record).await? {
            NavigationOutcome::Completed => Ok(()),
            NavigationOutcome::Interrupted => Err(AgentError::Interrupted),
        }
    }

    /// Loading and hand-off both take `loading_steps` separate sleeps
    async fn hold(&self) -> AgentResult<()> {
        let profile = self.settings.profile;
        for _ in 0..profile.loading_steps {
            self.pause(profile.loading_step()).await?;
        }
        Ok(())
    }

    async fn pause(&self, duration: Duration) -> AgentResult<()> {
        if pause(&self.sleeper, &self.shutdown, duration).await {
            Ok(())
        } else {
            Err(AgentError::Interrupted)
        }
    }

    /// Status lines are informational; a failed announcement is logged only
    async fn announce(&mut self, status: &str) {
        self.record.set_status(status);
        if let Err(e) = self.client.announce_status(status).await {
            warn!(status, error = %e, "Status announcement failed");
        }
    }

    fn transition(&mut self, next: AgentState) {
        info!(from = %self.state, to = %next, "State transition");
        metrics().set_agent_state(next.name());
        self.state_tx.send_replace(next.clone());
        self.state = next;
    }

    async fn stop(&mut self) {
        info!(state = %self.state, "Shutdown requested");
        if self.state.is_registered() {
            self.deregister().await;
        }
        self.transition(AgentState::Deregistered);
    }

    async fn fail(&mut self, error: AgentError) {
        error!(state = %self.state, error = %error, "Fatal error");
        if self.state.is_registered() {
            self.deregister().await;
        }
        self.transition(AgentState::Failed(error.to_string()));
    }

    /// Best effort; errors are logged and swallowed
    async fn deregister(&self) {
        match self.client.deregister().await {
            Ok(()) => info!("Deregistered"),
            Err(e) => warn!(error = %e, "Deregistration failed, ignoring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        Color, ProtocolGeneration, RegistrationPayload, Request, Response, StatusCode,
    };
    use crate::testing::{MockSleeper, MockTransport};
    use bytes::Bytes;

    const TWO_NODE_MAP: &str = "0 0 0 0\n2\n0 0 0 0\n1 5\n1 5 0 0\n0 5\n";

    fn settings() -> LifecycleSettings {
        LifecycleSettings {
            profile: AgentProfile {
                loading_step_ms: 7,
                loading_steps: 2,
                movement_step_ms: 3,
                steps_per_edge: 2,
            },
            no_task_backoff: Duration::from_millis(11),
        }
    }

    fn registration() -> Response {
        Response::new(
            StatusCode::Success,
            RegistrationPayload {
                graph_index: 1,
                map_text: TWO_NODE_MAP.to_string(),
            }
            .encode(),
        )
    }

    fn lifecycle(transport: MockTransport) -> AgentLifecycle<MockTransport, MockSleeper> {
        AgentLifecycle::new(
            AgentIdentity::new("unit", Color::new(0.0, 1.0, 0.0)),
            transport,
            Codec::new(ProtocolGeneration::Current),
            MockSleeper::new(),
            ShutdownSignal::never(),
            settings(),
        )
    }

    #[tokio::test]
    async fn test_registration_walks_home() {
        let transport = MockTransport::new(|request| match request {
            Request::Registration { .. } => registration(),
            _ => Response::ack(),
        });
        let mut lifecycle = lifecycle(transport);
        let mut states = lifecycle.subscribe();

        lifecycle.step().await.unwrap();
        assert_eq!(lifecycle.state(), &AgentState::Registering);
        lifecycle.step().await.unwrap();
        assert_eq!(lifecycle.state(), &AgentState::Idle);
        assert_eq!(lifecycle.map().unwrap().len(), 2);
        assert_eq!(lifecycle.record().location, Some(1));

        lifecycle.step().await.unwrap();
        lifecycle.step().await.unwrap();
        assert_eq!(lifecycle.state(), &AgentState::AwaitingTask);
        assert_eq!(*states.borrow_and_update(), AgentState::AwaitingTask);
        assert_eq!(lifecycle.record().location, Some(0));
        assert_eq!(lifecycle.record().status_message, WAITING_FOR_TASK);
    }

    #[tokio::test]
    async fn test_loading_takes_separate_sleeps() {
        let transport = MockTransport::new(|request| match request {
            Request::Registration { .. } => registration(),
            Request::RequestForTask { .. } => Response::new(
                StatusCode::Success,
                crate::protocol::TaskAssignment {
                    name: "box".to_string(),
                    destination: 1,
                }
                .encode(),
            ),
            _ => Response::ack(),
        });
        let mut lifecycle = lifecycle(transport);
        for _ in 0..5 {
            lifecycle.step().await.unwrap();
        }
        assert!(matches!(lifecycle.state(), AgentState::Loading(_)));
        assert_eq!(lifecycle.record().status_message, "loading box");

        let before = lifecycle.sleeper.durations().await.len();
        lifecycle.step().await.unwrap();
        let after = lifecycle.sleeper.durations().await;
        assert_eq!(&after[before..], &[Duration::from_millis(7); 2]);
        assert!(matches!(lifecycle.state(), AgentState::Delivering(_)));
    }

    #[tokio::test]
    async fn test_registration_failure_is_terminal() {
        let transport =
            MockTransport::new(|_| Response::new(StatusCode::FailureNameTaken, Bytes::new()));
        let mut lifecycle = lifecycle(transport);

        let state = lifecycle.run().await;

        assert!(matches!(state, AgentState::Failed(_)));
        assert_eq!(lifecycle.client().transport().requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_map_is_terminal() {
        let transport = MockTransport::new(|_| {
            Response::new(
                StatusCode::Success,
                RegistrationPayload {
                    graph_index: 0,
                    map_text: "not a map".to_string(),
                }
                .encode(),
            )
        });
        let mut lifecycle = lifecycle(transport);

        let state = lifecycle.run().await;

        assert!(matches!(state, AgentState::Failed(ref reason) if reason.contains("parse")));
        assert_eq!(lifecycle.client().transport().requests().await.len(), 1);
    }
}
