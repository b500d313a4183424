//! Typed request helpers on top of a [`Transport`]
//!
//! One method per request type. Each method encodes the request, performs a
//! single round trip, decodes the response and turns a non-success status
//! into [`AgentError::Rejected`], except where a failure status is an
//! expected answer (no tasks available).

use crate::error::{AgentError, AgentResult};
use crate::observability::metrics;
use crate::protocol::{
    Codec, Color, RegistrationPayload, Request, RequestType, Response, SensorType, StatusCode,
    TaskAssignment,
};
use crate::request_span;
use crate::transport::Transport;
use bytes::Bytes;
use tracing::{debug, Instrument};

/// Answer to a task poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    Assigned(TaskAssignment),
    NoTasks,
}

/// Sensor data returned by a camera request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    pub sensor: SensorType,
    pub response_id: u32,
    pub data: Bytes,
}

/// Issues dispatch requests on behalf of one named agent
pub struct DispatchClient<T: Transport> {
    transport: T,
    codec: Codec,
    name: String,
}

impl<T: Transport> DispatchClient<T> {
    pub fn new(transport: T, codec: Codec, name: impl Into<String>) -> Self {
        Self {
            transport,
            codec,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Register and return the assigned graph index plus the raw map text
    pub async fn register(&self, color: Color) -> AgentResult<RegistrationPayload> {
        let response = self
            .send(Request::Registration {
                color,
                name: self.name.clone(),
            })
            .await?;
        let response = Self::require_success(RequestType::Registration, response)?;
        Ok(RegistrationPayload::decode(&response.payload)?)
    }

    /// Ask for a task; "no tasks" is an ordinary answer, not an error
    pub async fn request_task(&self) -> AgentResult<TaskPoll> {
        let response = self
            .send(Request::RequestForTask {
                name: self.name.clone(),
            })
            .await?;
        if response.status() == StatusCode::FailureNoTasks {
            metrics().no_task_poll();
            return Ok(TaskPoll::NoTasks);
        }
        let response = Self::require_success(RequestType::RequestForTask, response)?;
        Ok(TaskPoll::Assigned(TaskAssignment::decode(&response.payload)?))
    }

    pub async fn send_position(&self, start_node: u32, end_node: u32, fraction: f32) -> AgentResult<()> {
        let response = self
            .send(Request::PositionUpdate {
                start_node,
                end_node,
                fraction,
                name: self.name.clone(),
            })
            .await?;
        Self::require_success(RequestType::PositionUpdate, response)?;
        Ok(())
    }

    /// Announce a status line
    ///
    /// Returns `Ok(false)` without sending anything when the protocol
    /// generation has no status request.
    pub async fn announce_status(&self, status: &str) -> AgentResult<bool> {
        if !self.codec.schema().supports(RequestType::StatusUpdate) {
            debug!(
                agent = %self.name,
                status,
                generation = %self.codec.generation(),
                "Status updates not supported, keeping status locally"
            );
            return Ok(false);
        }
        let response = self
            .send(Request::StatusUpdate {
                status: status.to_string(),
                name: self.name.clone(),
            })
            .await?;
        Self::require_success(RequestType::StatusUpdate, response)?;
        Ok(true)
    }

    pub async fn task_complete(&self) -> AgentResult<()> {
        let response = self
            .send(Request::TaskComplete {
                name: self.name.clone(),
            })
            .await?;
        Self::require_success(RequestType::TaskComplete, response)?;
        Ok(())
    }

    pub async fn request_camera_data(&self) -> AgentResult<SensorReading> {
        let response = self
            .send(Request::RequestForCameraData {
                name: self.name.clone(),
            })
            .await?;
        let response = Self::require_success(RequestType::RequestForCameraData, response)?;
        Ok(SensorReading {
            sensor: response.header.sensor,
            response_id: response.header.response_id,
            data: response.payload,
        })
    }

    pub async fn deregister(&self) -> AgentResult<()> {
        let response = self
            .send(Request::Deregistration {
                name: self.name.clone(),
            })
            .await?;
        Self::require_success(RequestType::Deregistration, response)?;
        Ok(())
    }

    /// One encode / round trip / decode cycle
    async fn send(&self, request: Request) -> AgentResult<Response> {
        let request_type = request.request_type();
        let span = request_span!(request = %request_type, agent = %self.name);
        self.exchange(&request).instrument(span).await
    }

    async fn exchange(&self, request: &Request) -> AgentResult<Response> {
        let encoded = self.codec.encode_request(request)?;
        debug!(peer = %self.transport.peer(), bytes = encoded.frame.len(), "Sending request");

        let body = match self.transport.round_trip(&encoded.frame, &self.codec).await {
            Ok(body) => body,
            Err(e) => {
                metrics().request_failed();
                return Err(e.into());
            }
        };
        let response = match self.codec.decode_response(&body) {
            Ok(response) => response,
            Err(e) => {
                metrics().request_failed();
                return Err(e.into());
            }
        };

        metrics().response_received(request.request_type(), response.status());
        debug!(
            status = ?response.status(),
            payload_len = response.payload.len(),
            "Received response"
        );
        Ok(response)
    }

    fn require_success(request: RequestType, response: Response) -> AgentResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            metrics().request_rejected();
            Err(AgentError::rejected(request, response.status()))
        }
    }
}
