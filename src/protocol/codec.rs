//! Binary codec for the dispatch protocol
//!
//! Requests are fixed-size bodies behind a 4-byte big-endian length prefix.
//! Responses are read in two stages: the prefix, then exactly the number of
//! bytes it announces. Both directions are driven by the generation's
//! [`ProtocolSchema`], so the agent and any server built on this codec agree
//! on every size and convention.

use super::messages::{
    Color, Request, RequestType, Response, ResponseHeader, SensorType, StatusCode, NAME_WIDTH,
    STATUS_WIDTH,
};
use super::schema::{ProtocolGeneration, ProtocolSchema, ResponseLayout, LENGTH_PREFIX_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("connection closed after {received} of {expected} expected bytes")]
    ShortRead { expected: usize, received: usize },
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("unknown status code byte: {0}")]
    UnknownStatusCode(u8),
    #[error("{request_type} is not part of the {generation} protocol generation")]
    UnsupportedRequest {
        request_type: RequestType,
        generation: ProtocolGeneration,
    },
    #[error("status {status:?} cannot be expressed in the {generation} protocol generation")]
    UnsupportedStatus {
        status: StatusCode,
        generation: ProtocolGeneration,
    },
    #[error("I/O error while reading frame")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True for every error that means "the bytes arrived but were wrong"
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CodecError::MalformedPacket(_) | CodecError::UnknownStatusCode(_)
        )
    }

    fn malformed(message: impl Into<String>) -> Self {
        CodecError::MalformedPacket(message.into())
    }
}

/// A string field that did not fit its fixed width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub field: &'static str,
    pub original_len: usize,
    pub width: usize,
}

/// Encoded request frame plus any truncations applied while encoding
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    /// Length prefix followed by the fixed-size body
    pub frame: Bytes,
    pub truncations: Vec<Truncation>,
}

impl EncodedRequest {
    pub fn was_truncated(&self) -> bool {
        !self.truncations.is_empty()
    }
}

/// Schema-driven encoder/decoder for one protocol generation
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    schema: &'static ProtocolSchema,
}

impl Codec {
    pub fn new(generation: ProtocolGeneration) -> Self {
        Self {
            schema: generation.schema(),
        }
    }

    pub fn schema(&self) -> &'static ProtocolSchema {
        self.schema
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.schema.generation
    }

    // ========== REQUESTS ==========

    /// Encode a request into a length-prefixed, fixed-size frame
    pub fn encode_request(&self, request: &Request) -> Result<EncodedRequest, CodecError> {
        let request_type = request.request_type();
        if !self.schema.supports(request_type) {
            return Err(CodecError::UnsupportedRequest {
                request_type,
                generation: self.schema.generation,
            });
        }

        let mut truncations = Vec::new();
        let mut body = BytesMut::with_capacity(self.schema.request_body_len);
        body.put_u8(request_type.discriminant());

        match request {
            Request::Registration { color, name } => {
                body.put_f32(color.r);
                body.put_f32(color.g);
                body.put_f32(color.b);
                put_fixed_str(&mut body, name, NAME_WIDTH, "name", &mut truncations);
            }
            Request::PositionUpdate {
                start_node,
                end_node,
                fraction,
                name,
            } => {
                body.put_u32(*start_node);
                body.put_u32(*end_node);
                body.put_f32(*fraction);
                put_fixed_str(&mut body, name, NAME_WIDTH, "name", &mut truncations);
            }
            Request::StatusUpdate { status, name } => {
                put_fixed_str(&mut body, status, STATUS_WIDTH, "status", &mut truncations);
                put_fixed_str(&mut body, name, NAME_WIDTH, "name", &mut truncations);
            }
            Request::RequestForTask { name }
            | Request::TaskComplete { name }
            | Request::RequestForCameraData { name }
            | Request::Deregistration { name } => {
                put_fixed_str(&mut body, name, NAME_WIDTH, "name", &mut truncations);
            }
        }

        if body.len() > self.schema.request_body_len {
            return Err(CodecError::malformed(format!(
                "{request_type} fields need {} bytes but {} bodies are {} bytes",
                body.len(),
                self.schema.generation,
                self.schema.request_body_len
            )));
        }
        body.resize(self.schema.request_body_len, 0);

        for truncation in &truncations {
            warn!(
                request = %request_type,
                field = truncation.field,
                original_len = truncation.original_len,
                width = truncation.width,
                "Truncated string field to fit fixed wire width"
            );
        }

        Ok(EncodedRequest {
            frame: self.frame(&body),
            truncations,
        })
    }

    /// Decode a request body (the bytes after the length prefix)
    pub fn decode_request(&self, body: &[u8]) -> Result<Request, CodecError> {
        if body.len() != self.schema.request_body_len {
            return Err(CodecError::malformed(format!(
                "request body is {} bytes, expected {}",
                body.len(),
                self.schema.request_body_len
            )));
        }

        let mut buf = body;
        let type_byte = buf.get_u8();
        let request_type = RequestType::from_discriminant(type_byte)
            .filter(|t| self.schema.supports(*t))
            .ok_or_else(|| CodecError::malformed(format!("unknown request type {type_byte}")))?;

        let request = match request_type {
            RequestType::Registration => {
                let color = Color::new(buf.get_f32(), buf.get_f32(), buf.get_f32());
                Request::Registration {
                    color,
                    name: take_fixed_str(&mut buf, NAME_WIDTH),
                }
            }
            RequestType::PositionUpdate => Request::PositionUpdate {
                start_node: buf.get_u32(),
                end_node: buf.get_u32(),
                fraction: buf.get_f32(),
                name: take_fixed_str(&mut buf, NAME_WIDTH),
            },
            RequestType::StatusUpdate => {
                let status = take_fixed_str(&mut buf, STATUS_WIDTH);
                Request::StatusUpdate {
                    status,
                    name: take_fixed_str(&mut buf, NAME_WIDTH),
                }
            }
            RequestType::RequestForTask => Request::RequestForTask {
                name: take_fixed_str(&mut buf, NAME_WIDTH),
            },
            RequestType::TaskComplete => Request::TaskComplete {
                name: take_fixed_str(&mut buf, NAME_WIDTH),
            },
            RequestType::RequestForCameraData => Request::RequestForCameraData {
                name: take_fixed_str(&mut buf, NAME_WIDTH),
            },
            RequestType::Deregistration => Request::Deregistration {
                name: take_fixed_str(&mut buf, NAME_WIDTH),
            },
        };

        Ok(request)
    }

    // ========== RESPONSES ==========

    /// Encode a response into a length-prefixed frame
    pub fn encode_response(&self, response: &Response) -> Result<Bytes, CodecError> {
        let header = &response.header;
        let status_byte = self.schema.status_to_byte(header.status).ok_or(
            CodecError::UnsupportedStatus {
                status: header.status,
                generation: self.schema.generation,
            },
        )?;

        let layout = self.schema.response_layout;
        let mut body = BytesMut::with_capacity(layout.header_len() + response.payload.len());
        body.put_u8(status_byte);
        if layout == ResponseLayout::Extended {
            body.put_u8(header.sensor.to_byte());
            body.put_u32(header.response_id);
            body.put_u32(response.payload.len() as u32);
        }
        body.extend_from_slice(&response.payload);

        Ok(self.frame(&body))
    }

    /// Decode a response body (the bytes after the length prefix)
    ///
    /// The whole packet is rejected on any inconsistency; nothing is
    /// partially interpreted.
    pub fn decode_response(&self, body: &[u8]) -> Result<Response, CodecError> {
        let layout = self.schema.response_layout;
        if body.len() < layout.header_len() {
            return Err(CodecError::malformed(format!(
                "response of {} bytes is shorter than the {}-byte header",
                body.len(),
                layout.header_len()
            )));
        }

        let mut buf = body;
        let status_byte = buf.get_u8();
        let status = self
            .schema
            .status_from_byte(status_byte)
            .ok_or(CodecError::UnknownStatusCode(status_byte))?;

        let header = match layout {
            ResponseLayout::Extended => {
                let sensor_byte = buf.get_u8();
                let sensor = SensorType::from_byte(sensor_byte).ok_or_else(|| {
                    CodecError::malformed(format!("unknown sensor type {sensor_byte}"))
                })?;
                let response_id = buf.get_u32();
                let declared = buf.get_u32() as usize;
                if declared != buf.remaining() {
                    return Err(CodecError::malformed(format!(
                        "declared payload size {declared} does not match observed size {}",
                        buf.remaining()
                    )));
                }
                ResponseHeader {
                    status,
                    sensor,
                    response_id,
                }
            }
            ResponseLayout::StatusOnly => ResponseHeader::with_status(status),
        };

        Ok(Response {
            header,
            payload: Bytes::copy_from_slice(buf),
        })
    }

    // ========== FRAMING ==========

    /// Read one frame: the length prefix, then exactly the remaining bytes
    ///
    /// Returns the bytes after the prefix. Blocks until the frame is complete
    /// or the peer closes; an early close is a [`CodecError::ShortRead`].
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Bytes, CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        read_fully(reader, &mut prefix).await?;
        let declared = u32::from_be_bytes(prefix);

        let remaining = self.schema.remaining_after_prefix(declared).ok_or_else(|| {
            CodecError::malformed(format!(
                "length prefix {declared} is smaller than the prefix itself"
            ))
        })?;
        if remaining > self.schema.max_frame_len {
            return Err(CodecError::malformed(format!(
                "frame of {remaining} bytes exceeds the {} byte limit",
                self.schema.max_frame_len
            )));
        }

        let mut body = BytesMut::zeroed(remaining);
        read_fully(reader, &mut body).await?;
        Ok(body.freeze())
    }

    fn frame(&self, body: &[u8]) -> Bytes {
        let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + body.len());
        frame.put_u32(self.schema.prefix_value(body.len()) as u32);
        frame.extend_from_slice(body);
        frame.freeze()
    }
}

/// Fill `buf` completely, reporting how far we got if the peer closes early
async fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(CodecError::ShortRead {
                expected: buf.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Write `value` as ASCII, right-padded with spaces to `width`
///
/// Non-ASCII characters become `?`. Values longer than `width` are cut and
/// the cut is recorded in `truncations`.
pub fn put_fixed_str(
    buf: &mut BytesMut,
    value: &str,
    width: usize,
    field: &'static str,
    truncations: &mut Vec<Truncation>,
) {
    let ascii: Vec<u8> = value
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect();

    if ascii.len() > width {
        truncations.push(Truncation {
            field,
            original_len: ascii.len(),
            width,
        });
    }

    let kept = ascii.len().min(width);
    buf.extend_from_slice(&ascii[..kept]);
    buf.put_bytes(b' ', width - kept);
}

/// Read a space-padded fixed-width string, dropping the padding
pub fn take_fixed_str(buf: &mut &[u8], width: usize) -> String {
    let raw = &buf[..width];
    let text = String::from_utf8_lossy(raw)
        .trim_end_matches([' ', '\0'])
        .to_string();
    buf.advance(width);
    text
}
