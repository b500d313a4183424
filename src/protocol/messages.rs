//! Message types for the dispatch wire protocol
//!
//! Requests flow from the agent to the dispatch server, responses flow back.
//! Every value here is constructed immediately before an encode and dropped
//! right after a decode; nothing is persisted.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the agent name field in every request body
pub const NAME_WIDTH: usize = 16;

/// Width of the status text field in a STATUS_UPDATE body
pub const STATUS_WIDTH: usize = 31;

/// Width of the task name at the start of a task-request response payload
pub const TASK_NAME_WIDTH: usize = 32;

/// Request discriminant, the first byte of every request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Registration,
    RequestForTask,
    PositionUpdate,
    TaskComplete,
    RequestForCameraData,
    Deregistration,
    StatusUpdate,
}

impl RequestType {
    /// Wire value of this request type
    pub fn discriminant(self) -> u8 {
        match self {
            RequestType::Registration => 0,
            RequestType::RequestForTask => 1,
            RequestType::PositionUpdate => 2,
            RequestType::TaskComplete => 3,
            RequestType::RequestForCameraData => 4,
            RequestType::Deregistration => 5,
            RequestType::StatusUpdate => 6,
        }
    }

    /// Reverse of [`RequestType::discriminant`]
    pub fn from_discriminant(value: u8) -> Option<Self> {
        match value {
            0 => Some(RequestType::Registration),
            1 => Some(RequestType::RequestForTask),
            2 => Some(RequestType::PositionUpdate),
            3 => Some(RequestType::TaskComplete),
            4 => Some(RequestType::RequestForCameraData),
            5 => Some(RequestType::Deregistration),
            6 => Some(RequestType::StatusUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestType::Registration => "REGISTRATION",
            RequestType::RequestForTask => "REQUEST_FOR_TASK",
            RequestType::PositionUpdate => "POSITION_UPDATE",
            RequestType::TaskComplete => "TASK_COMPLETE",
            RequestType::RequestForCameraData => "REQUEST_FOR_CAMERA_DATA",
            RequestType::Deregistration => "DEREGISTRATION",
            RequestType::StatusUpdate => "STATUS_UPDATE",
        };
        f.write_str(name)
    }
}

/// Outcome of a request as reported by the server
///
/// The byte value of each code depends on the protocol generation, see
/// [`crate::protocol::ProtocolSchema::status_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Success,
    FailureAgentTooFar,
    FailureNoTasks,
    FailureRequestParsingError,
    FailureNameTaken,
    FailureOther,
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }

    /// Human-readable explanation, used in logs when a request is rejected
    pub fn message(self) -> &'static str {
        match self {
            StatusCode::Success => "request succeeded",
            StatusCode::FailureAgentTooFar => "agent is too far away to do that",
            StatusCode::FailureNoTasks => "no tasks are available right now",
            StatusCode::FailureRequestParsingError => "server could not parse the request",
            StatusCode::FailureNameTaken => "preferred name is already registered",
            StatusCode::FailureOther => "server reported an unspecified failure",
        }
    }
}

/// Sensor type byte carried by the extended (legacy) response header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Response carries no sensor data
    None,
    /// Response payload is a camera frame
    Camera,
}

impl SensorType {
    pub fn to_byte(self) -> u8 {
        match self {
            SensorType::None => 0,
            SensorType::Camera => 1,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(SensorType::None),
            1 => Some(SensorType::Camera),
            _ => None,
        }
    }
}

/// Agent display color, RGB components in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn components(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    pub fn is_normalized(&self) -> bool {
        self.components()
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }
}

impl From<[f32; 3]> for Color {
    fn from(value: [f32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

/// An outbound request, one variant per [`RequestType`]
///
/// String fields hold the logical value; the codec pads or truncates them to
/// the fixed wire widths.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Registration {
        color: Color,
        name: String,
    },
    RequestForTask {
        name: String,
    },
    PositionUpdate {
        start_node: u32,
        end_node: u32,
        fraction: f32,
        name: String,
    },
    TaskComplete {
        name: String,
    },
    RequestForCameraData {
        name: String,
    },
    Deregistration {
        name: String,
    },
    StatusUpdate {
        status: String,
        name: String,
    },
}

impl Request {
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::Registration { .. } => RequestType::Registration,
            Request::RequestForTask { .. } => RequestType::RequestForTask,
            Request::PositionUpdate { .. } => RequestType::PositionUpdate,
            Request::TaskComplete { .. } => RequestType::TaskComplete,
            Request::RequestForCameraData { .. } => RequestType::RequestForCameraData,
            Request::Deregistration { .. } => RequestType::Deregistration,
            Request::StatusUpdate { .. } => RequestType::StatusUpdate,
        }
    }

    /// Name of the agent issuing the request
    pub fn agent_name(&self) -> &str {
        match self {
            Request::Registration { name, .. }
            | Request::RequestForTask { name }
            | Request::PositionUpdate { name, .. }
            | Request::TaskComplete { name }
            | Request::RequestForCameraData { name }
            | Request::Deregistration { name }
            | Request::StatusUpdate { name, .. } => name,
        }
    }
}

/// Fixed header fields of a response
///
/// `sensor` and `response_id` are only present on the wire in the extended
/// header layout; the status-only layout decodes them as `SensorType::None`
/// and `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: StatusCode,
    pub sensor: SensorType,
    pub response_id: u32,
}

impl ResponseHeader {
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            sensor: SensorType::None,
            response_id: 0,
        }
    }
}

/// An inbound response: header plus opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub header: ResponseHeader,
    pub payload: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, payload: impl Into<Bytes>) -> Self {
        Self {
            header: ResponseHeader::with_status(status),
            payload: payload.into(),
        }
    }

    /// Success response with an empty payload (plain acknowledgement)
    pub fn ack() -> Self {
        Self::new(StatusCode::Success, Bytes::new())
    }

    pub fn status(&self) -> StatusCode {
        self.header.status
    }
}
