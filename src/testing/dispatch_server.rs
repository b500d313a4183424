//! In-process dispatch server speaking the real wire protocol
//!
//! Used by the end-to-end tests and by the `dispatch-stub` binary. It hands
//! out a fixed map, serves tasks from a queue and checks that position
//! updates follow edges of the map.

use crate::map::Map;
use crate::protocol::{
    Codec, ProtocolGeneration, RegistrationPayload, Request, RequestType, Response, SensorType,
    StatusCode, TaskAssignment,
};
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Builder for [`FakeDispatchServer`]
#[derive(Debug, Clone)]
pub struct FakeDispatchBuilder {
    map: Map,
    generation: ProtocolGeneration,
    bind: String,
    spawn_index: Option<u32>,
    tasks: Vec<TaskAssignment>,
    repeat_tasks: bool,
    overrides: HashMap<RequestType, StatusCode>,
}

impl FakeDispatchBuilder {
    pub fn generation(mut self, generation: ProtocolGeneration) -> Self {
        self.generation = generation;
        self
    }

    /// Listen address, `127.0.0.1:0` by default
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind = addr.into();
        self
    }

    /// Graph index handed to registering agents; HQ by default
    pub fn spawn_at(mut self, graph_index: u32) -> Self {
        self.spawn_index = Some(graph_index);
        self
    }

    pub fn task(mut self, name: impl Into<String>, destination: u32) -> Self {
        self.tasks.push(TaskAssignment {
            name: name.into(),
            destination,
        });
        self
    }

    /// Put served tasks back at the end of the queue
    pub fn repeat_tasks(mut self, repeat: bool) -> Self {
        self.repeat_tasks = repeat;
        self
    }

    /// Answer every request of `request_type` with `status`
    pub fn respond_with(mut self, request_type: RequestType, status: StatusCode) -> Self {
        self.overrides.insert(request_type, status);
        self
    }

    pub async fn start(self) -> std::io::Result<FakeDispatchServer> {
        let listener = TcpListener::bind(&self.bind).await?;
        let addr = listener.local_addr()?;
        let codec = Codec::new(self.generation);

        let spawn_index = self.spawn_index.unwrap_or(self.map.hq().graph_index);
        let state = Arc::new(Mutex::new(DispatchState {
            map_text: self.map.to_text(),
            map: self.map,
            spawn_index,
            tasks: self.tasks.into(),
            repeat_tasks: self.repeat_tasks,
            overrides: self.overrides,
            agents: HashSet::new(),
            requests: Vec::new(),
            next_response_id: 1,
        }));

        info!(%addr, generation = %codec.generation(), "Dispatch server listening");
        let handle = tokio::spawn(accept_loop(listener, codec, state.clone()));

        Ok(FakeDispatchServer {
            addr,
            state,
            handle,
        })
    }
}

/// Running dispatch server; stops when dropped
#[derive(Debug)]
pub struct FakeDispatchServer {
    addr: SocketAddr,
    state: Arc<Mutex<DispatchState>>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct DispatchState {
    map: Map,
    map_text: String,
    spawn_index: u32,
    tasks: VecDeque<TaskAssignment>,
    repeat_tasks: bool,
    overrides: HashMap<RequestType, StatusCode>,
    agents: HashSet<String>,
    requests: Vec<Request>,
    next_response_id: u32,
}

impl FakeDispatchServer {
    pub fn builder(map: Map) -> FakeDispatchBuilder {
        FakeDispatchBuilder {
            map,
            generation: ProtocolGeneration::default(),
            bind: "127.0.0.1:0".to_string(),
            spawn_index: None,
            tasks: Vec::new(),
            repeat_tasks: false,
            overrides: HashMap::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every well-formed request received so far, in arrival order
    pub async fn requests(&self) -> Vec<Request> {
        self.state.lock().await.requests.clone()
    }

    pub async fn registered_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.state.lock().await.agents.iter().cloned().collect();
        agents.sort();
        agents
    }

    pub async fn remaining_tasks(&self) -> usize {
        self.state.lock().await.tasks.len()
    }
}

impl Drop for FakeDispatchServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn accept_loop(listener: TcpListener, codec: Codec, state: Arc<Mutex<DispatchState>>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(socket, codec, state).await {
                        debug!(%peer, error = %e, "Connection ended with error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                return;
            }
        }
    }
}

/// One request, one response, then close
async fn serve_connection(
    mut socket: TcpStream,
    codec: Codec,
    state: Arc<Mutex<DispatchState>>,
) -> Result<(), crate::protocol::CodecError> {
    let body = codec.read_frame(&mut socket).await?;
    let response = match codec.decode_request(&body) {
        Ok(request) => {
            debug!(request = %request.request_type(), agent = request.agent_name(), "Request received");
            state.lock().await.handle(request, codec.generation())
        }
        Err(e) => {
            warn!(error = %e, "Rejecting unparseable request");
            Response::new(StatusCode::FailureRequestParsingError, Bytes::new())
        }
    };

    let frame = codec.encode_response(&response)?;
    socket.write_all(&frame).await?;
    socket.shutdown().await?;
    Ok(())
}

impl DispatchState {
    fn handle(&mut self, request: Request, generation: ProtocolGeneration) -> Response {
        self.requests.push(request.clone());

        if let Some(status) = self.overrides.get(&request.request_type()) {
            return Response::new(*status, Bytes::new());
        }

        let name = request.agent_name().to_string();
        if !matches!(request, Request::Registration { .. }) && !self.agents.contains(&name) {
            return Response::new(StatusCode::FailureOther, Bytes::new());
        }

        match request {
            Request::Registration { .. } => {
                let taken = self.agents.contains(&name);
                if taken && generation.schema().status_to_byte(StatusCode::FailureNameTaken).is_some() {
                    return Response::new(StatusCode::FailureNameTaken, Bytes::new());
                }
                self.agents.insert(name);
                let payload = RegistrationPayload {
                    graph_index: self.spawn_index,
                    map_text: self.map_text.clone(),
                };
                Response::new(StatusCode::Success, payload.encode())
            }
            Request::RequestForTask { .. } => match self.tasks.pop_front() {
                Some(task) => {
                    if self.repeat_tasks {
                        self.tasks.push_back(task.clone());
                    }
                    Response::new(StatusCode::Success, task.encode())
                }
                None => Response::new(StatusCode::FailureNoTasks, Bytes::new()),
            },
            Request::PositionUpdate {
                start_node,
                end_node,
                ..
            } => {
                let on_map = if start_node == end_node {
                    self.map.contains(start_node) || self.map.hq().graph_index == start_node
                } else {
                    self.map.edge_weight(start_node, end_node).is_some()
                };
                if on_map {
                    Response::ack()
                } else {
                    Response::new(StatusCode::FailureAgentTooFar, Bytes::new())
                }
            }
            Request::RequestForCameraData { .. } => {
                let mut response =
                    Response::new(StatusCode::Success, Bytes::from(format!("frame:{name}")));
                response.header.sensor = SensorType::Camera;
                response.header.response_id = self.next_response_id;
                self.next_response_id += 1;
                response
            }
            Request::Deregistration { .. } => {
                self.agents.remove(&name);
                Response::ack()
            }
            Request::TaskComplete { .. } | Request::StatusUpdate { .. } => Response::ack(),
        }
    }
}
