//! Versioned protocol schema table
//!
//! The dispatch protocol went through more than one generation: body sizes,
//! length-prefix conventions, response header layouts and status-code sets
//! all changed. Each generation is described once, here, and the codec reads
//! everything it needs from the table instead of branching at call sites.

use super::messages::{RequestType, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the big-endian length prefix in front of every frame
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Which protocol generation a connection speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolGeneration {
    /// 32-byte request bodies, prefix counts itself, extended response header
    Legacy,
    /// 64-byte request bodies, prefix excludes itself, status-only header
    #[default]
    Current,
}

impl ProtocolGeneration {
    /// Schema table entry for this generation
    pub fn schema(self) -> &'static ProtocolSchema {
        match self {
            ProtocolGeneration::Legacy => &LEGACY,
            ProtocolGeneration::Current => &CURRENT,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "v1" => Some(ProtocolGeneration::Legacy),
            "current" | "v2" => Some(ProtocolGeneration::Current),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolGeneration::Legacy => f.write_str("legacy"),
            ProtocolGeneration::Current => f.write_str("current"),
        }
    }
}

/// Whether the 4-byte length prefix counts its own bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthConvention {
    /// Prefix value = 4 + remaining bytes
    IncludesPrefix,
    /// Prefix value = remaining bytes
    ExcludesPrefix,
}

/// Layout of the fixed response header that follows the length prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLayout {
    /// status u8, sensor type u8, response id u32, payload size u32
    Extended,
    /// status u8 only; payload runs to the end of the frame
    StatusOnly,
}

impl ResponseLayout {
    pub fn header_len(self) -> usize {
        match self {
            ResponseLayout::Extended => 1 + 1 + 4 + 4,
            ResponseLayout::StatusOnly => 1,
        }
    }
}

/// One row of the schema table
#[derive(Debug, PartialEq)]
pub struct ProtocolSchema {
    pub generation: ProtocolGeneration,
    /// Fixed size of every request body, padding included
    pub request_body_len: usize,
    pub length_convention: LengthConvention,
    pub response_layout: ResponseLayout,
    /// Upper bound on the remaining bytes of an inbound frame
    pub max_frame_len: usize,
    /// Request types this generation carries
    pub request_types: &'static [RequestType],
    /// Status codes indexed by their wire byte
    pub status_table: &'static [StatusCode],
}

static LEGACY: ProtocolSchema = ProtocolSchema {
    generation: ProtocolGeneration::Legacy,
    request_body_len: 32,
    length_convention: LengthConvention::IncludesPrefix,
    response_layout: ResponseLayout::Extended,
    max_frame_len: 16 * 1024 * 1024,
    request_types: &[
        RequestType::Registration,
        RequestType::RequestForTask,
        RequestType::PositionUpdate,
        RequestType::TaskComplete,
        RequestType::RequestForCameraData,
        RequestType::Deregistration,
    ],
    status_table: &[
        StatusCode::Success,
        StatusCode::FailureAgentTooFar,
        StatusCode::FailureNoTasks,
        StatusCode::FailureRequestParsingError,
        StatusCode::FailureOther,
    ],
};

static CURRENT: ProtocolSchema = ProtocolSchema {
    generation: ProtocolGeneration::Current,
    request_body_len: 64,
    length_convention: LengthConvention::ExcludesPrefix,
    response_layout: ResponseLayout::StatusOnly,
    max_frame_len: 16 * 1024 * 1024,
    request_types: &[
        RequestType::Registration,
        RequestType::RequestForTask,
        RequestType::PositionUpdate,
        RequestType::TaskComplete,
        RequestType::RequestForCameraData,
        RequestType::Deregistration,
        RequestType::StatusUpdate,
    ],
    status_table: &[
        StatusCode::Success,
        StatusCode::FailureAgentTooFar,
        StatusCode::FailureNoTasks,
        StatusCode::FailureRequestParsingError,
        StatusCode::FailureNameTaken,
        StatusCode::FailureOther,
    ],
};

impl ProtocolSchema {
    pub fn supports(&self, request_type: RequestType) -> bool {
        self.request_types.contains(&request_type)
    }

    pub fn status_from_byte(&self, value: u8) -> Option<StatusCode> {
        self.status_table.get(value as usize).copied()
    }

    /// Wire byte for a status code, `None` if this generation lacks it
    pub fn status_to_byte(&self, status: StatusCode) -> Option<u8> {
        self.status_table
            .iter()
            .position(|s| *s == status)
            .map(|idx| idx as u8)
    }

    /// Value to put in the length prefix for a frame with `remaining` bytes
    pub fn prefix_value(&self, remaining: usize) -> usize {
        match self.length_convention {
            LengthConvention::IncludesPrefix => remaining + LENGTH_PREFIX_LEN,
            LengthConvention::ExcludesPrefix => remaining,
        }
    }

    /// Number of bytes still to read after a prefix carrying `declared`
    ///
    /// Returns `None` when the declared value cannot describe a valid frame
    /// (an inclusive prefix smaller than the prefix itself).
    pub fn remaining_after_prefix(&self, declared: u32) -> Option<usize> {
        let declared = declared as usize;
        match self.length_convention {
            LengthConvention::IncludesPrefix => declared.checked_sub(LENGTH_PREFIX_LEN),
            LengthConvention::ExcludesPrefix => Some(declared),
        }
    }
}
