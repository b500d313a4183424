//! Typed views of response payloads
//!
//! Registration responses carry the assigned graph index and the map text;
//! task responses carry a fixed-width task name and a destination index.

use super::codec::{put_fixed_str, take_fixed_str, CodecError};
use super::messages::TASK_NAME_WIDTH;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Payload of a successful REGISTRATION response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPayload {
    pub graph_index: u32,
    pub map_text: String,
}

impl RegistrationPayload {
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < 4 {
            return Err(CodecError::MalformedPacket(format!(
                "registration payload of {} bytes has no graph index",
                payload.len()
            )));
        }
        let mut buf = payload;
        let graph_index = buf.get_u32();
        let map_text = std::str::from_utf8(buf)
            .map_err(|e| CodecError::MalformedPacket(format!("map text is not text: {e}")))?
            .to_string();

        Ok(Self {
            graph_index,
            map_text,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.map_text.len());
        buf.put_u32(self.graph_index);
        buf.extend_from_slice(self.map_text.as_bytes());
        buf.freeze()
    }
}

/// Payload of a successful REQUEST_FOR_TASK response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAssignment {
    pub name: String,
    pub destination: u32,
}

impl TaskAssignment {
    pub const WIRE_LEN: usize = TASK_NAME_WIDTH + 4;

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() != Self::WIRE_LEN {
            return Err(CodecError::MalformedPacket(format!(
                "task payload is {} bytes, expected {}",
                payload.len(),
                Self::WIRE_LEN
            )));
        }
        let mut buf = payload;
        let name = take_fixed_str(&mut buf, TASK_NAME_WIDTH);
        let destination = buf.get_u32();

        Ok(Self { name, destination })
    }

    /// Encode for the server side; names longer than 32 bytes are cut
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_LEN);
        let mut truncations = Vec::new();
        put_fixed_str(
            &mut buf,
            &self.name,
            TASK_NAME_WIDTH,
            "task_name",
            &mut truncations,
        );
        buf.put_u32(self.destination);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_payload_decode() {
        let mut raw = 3u32.to_be_bytes().to_vec();
        raw.extend_from_slice(b"0 0 0 0\n1\n0 0 0 0\n");

        let payload = RegistrationPayload::decode(&raw).unwrap();
        assert_eq!(payload.graph_index, 3);
        assert_eq!(payload.map_text, "0 0 0 0\n1\n0 0 0 0\n");
        assert_eq!(&payload.encode()[..], &raw[..]);
    }

    #[test]
    fn test_registration_payload_too_short() {
        assert!(RegistrationPayload::decode(&[0, 1]).unwrap_err().is_malformed());
    }

    #[test]
    fn test_registration_payload_invalid_text() {
        let raw = [0, 0, 0, 1, 0xff, 0xfe];
        assert!(RegistrationPayload::decode(&raw).unwrap_err().is_malformed());
    }

    #[test]
    fn test_task_assignment_round_trip() {
        let task = TaskAssignment {
            name: "medical supplies".to_string(),
            destination: 12,
        };
        let raw = task.encode();
        assert_eq!(raw.len(), 36);
        assert_eq!(&raw[..16], b"medical supplies");
        assert!(raw[16..32].iter().all(|b| *b == b' '));
        assert_eq!(TaskAssignment::decode(&raw).unwrap(), task);
    }

    #[test]
    fn test_task_assignment_wrong_length() {
        assert!(TaskAssignment::decode(&[0u8; 35]).unwrap_err().is_malformed());
        assert!(TaskAssignment::decode(&[0u8; 37]).unwrap_err().is_malformed());
    }
}
