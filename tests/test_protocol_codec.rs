//! Wire codec property tests
//!
//! Every request type survives encode/decode on both protocol generations,
//! over-long names are cut to the wire width, and extended response headers
//! whose declared payload size disagrees with the bytes present are
//! rejected whole.

use bytes::{BufMut, BytesMut};
use courier_agent::protocol::{
    Codec, CodecError, Color, ProtocolGeneration, Request, RequestType, Response, StatusCode,
    LENGTH_PREFIX_LEN, NAME_WIDTH,
};
use proptest::prelude::*;
use tokio_test::io::Builder;

fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{0,16}"
}

fn request_strategy() -> impl Strategy<Value = Request> {
    let color = (0.0f32..=1.0, 0.0f32..=1.0, 0.0f32..=1.0);
    prop_oneof![
        (color, name_strategy()).prop_map(|((r, g, b), name)| Request::Registration {
            color: Color::new(r, g, b),
            name,
        }),
        name_strategy().prop_map(|name| Request::RequestForTask { name }),
        (any::<u32>(), any::<u32>(), 0.0f32..=1.0, name_strategy()).prop_map(
            |(start_node, end_node, fraction, name)| Request::PositionUpdate {
                start_node,
                end_node,
                fraction,
                name,
            }
        ),
        name_strategy().prop_map(|name| Request::TaskComplete { name }),
        name_strategy().prop_map(|name| Request::RequestForCameraData { name }),
        name_strategy().prop_map(|name| Request::Deregistration { name }),
        ("[a-z0-9]{1,31}", name_strategy())
            .prop_map(|(status, name)| Request::StatusUpdate { status, name }),
    ]
}

fn generation_strategy() -> impl Strategy<Value = ProtocolGeneration> {
    prop_oneof![
        Just(ProtocolGeneration::Legacy),
        Just(ProtocolGeneration::Current)
    ]
}

/// Extended (legacy) response body with an explicit declared payload size
fn extended_body(declared: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u8(0);
    body.put_u8(0);
    body.put_u32(9);
    body.put_u32(declared);
    body.extend_from_slice(payload);
    body.to_vec()
}

proptest! {
    #[test]
    fn prop_request_round_trip(request in request_strategy(), generation in generation_strategy()) {
        let codec = Codec::new(generation);
        let supported = codec.schema().supports(request.request_type());

        match codec.encode_request(&request) {
            Ok(encoded) => {
                prop_assert!(supported);
                prop_assert!(!encoded.was_truncated());
                prop_assert_eq!(
                    encoded.frame.len(),
                    LENGTH_PREFIX_LEN + codec.schema().request_body_len
                );
                let decoded = codec
                    .decode_request(&encoded.frame[LENGTH_PREFIX_LEN..])
                    .unwrap();
                prop_assert_eq!(decoded, request);
            }
            Err(CodecError::UnsupportedRequest { request_type, .. }) => {
                prop_assert!(!supported);
                prop_assert_eq!(request_type, RequestType::StatusUpdate);
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn prop_long_names_truncated(name in "[A-Za-z0-9]{17,40}", generation in generation_strategy()) {
        let codec = Codec::new(generation);
        let encoded = codec
            .encode_request(&Request::Deregistration { name: name.clone() })
            .unwrap();

        prop_assert_eq!(encoded.truncations.len(), 1);
        prop_assert_eq!(encoded.truncations[0].original_len, name.len());
        prop_assert_eq!(encoded.truncations[0].width, NAME_WIDTH);

        let decoded = codec
            .decode_request(&encoded.frame[LENGTH_PREFIX_LEN..])
            .unwrap();
        prop_assert_eq!(decoded.agent_name(), &name[..NAME_WIDTH]);
    }

    #[test]
    fn prop_payload_size_mismatch_rejected(
        payload in proptest::collection::vec(any::<u8>(), 0..64),
        delta in -64i64..=64,
    ) {
        prop_assume!(delta != 0);
        let declared = payload.len() as i64 + delta;
        prop_assume!(declared >= 0);

        let codec = Codec::new(ProtocolGeneration::Legacy);
        let body = extended_body(declared as u32, &payload);
        let err = codec.decode_response(&body).unwrap_err();
        prop_assert!(matches!(err, CodecError::MalformedPacket(_)), "got {:?}", err);
    }

    #[test]
    fn prop_matching_payload_size_accepted(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        let codec = Codec::new(ProtocolGeneration::Legacy);
        let body = extended_body(payload.len() as u32, &payload);
        let response = codec.decode_response(&body).unwrap();
        prop_assert_eq!(response.status(), StatusCode::Success);
        prop_assert_eq!(response.header.response_id, 9);
        prop_assert_eq!(&response.payload[..], &payload[..]);
    }
}

#[test]
fn test_every_declared_size_delta_rejected() {
    let codec = Codec::new(ProtocolGeneration::Legacy);
    let payload = [7u8; 12];
    for declared in 0..=40u32 {
        let result = codec.decode_response(&extended_body(declared, &payload));
        if declared as usize == payload.len() {
            assert!(result.is_ok());
        } else {
            assert!(
                matches!(result, Err(CodecError::MalformedPacket(_))),
                "declared {declared} accepted"
            );
        }
    }
}

#[test]
fn test_unknown_status_byte() {
    let current = Codec::new(ProtocolGeneration::Current);
    assert!(matches!(
        current.decode_response(&[6]),
        Err(CodecError::UnknownStatusCode(6))
    ));

    // Byte 5 is a valid status in current but not in legacy
    let legacy = Codec::new(ProtocolGeneration::Legacy);
    assert!(matches!(
        legacy.decode_response(&extended_body(0, &[])[..]).map(|r| r.status()),
        Ok(StatusCode::Success)
    ));
    let mut body = extended_body(0, &[]);
    body[0] = 5;
    assert!(matches!(
        legacy.decode_response(&body),
        Err(CodecError::UnknownStatusCode(5))
    ));
}

#[tokio::test]
async fn test_frame_read_across_chunks() {
    let codec = Codec::new(ProtocolGeneration::Current);
    let frame = codec
        .encode_response(&Response::new(StatusCode::Success, &b"hello map"[..]))
        .unwrap();

    let mut reader = Builder::new()
        .read(&frame[..2])
        .read(&frame[2..5])
        .read(&frame[5..7])
        .read(&frame[7..])
        .build();
    let body = codec.read_frame(&mut reader).await.unwrap();

    assert_eq!(&body[..], &frame[LENGTH_PREFIX_LEN..]);
    assert_eq!(codec.decode_response(&body).unwrap().payload, &b"hello map"[..]);
}

#[tokio::test]
async fn test_legacy_prefix_counts_itself() {
    let codec = Codec::new(ProtocolGeneration::Legacy);
    let frame = codec.encode_response(&Response::ack()).unwrap();

    let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    assert_eq!(declared as usize, frame.len());

    let mut reader = Builder::new().read(&frame).build();
    let body = codec.read_frame(&mut reader).await.unwrap();
    assert_eq!(codec.decode_response(&body).unwrap(), Response::ack());
}

#[tokio::test]
async fn test_early_eof_is_short_read() {
    let codec = Codec::new(ProtocolGeneration::Current);
    let mut reader = Builder::new()
        .read(&10u32.to_be_bytes())
        .read(b"abc")
        .build();

    let err = codec.read_frame(&mut reader).await.unwrap_err();
    assert!(matches!(
        err,
        CodecError::ShortRead {
            expected: 10,
            received: 3
        }
    ));
}

#[tokio::test]
async fn test_eof_inside_prefix_is_short_read() {
    let codec = Codec::new(ProtocolGeneration::Current);
    let mut reader = Builder::new().read(&[0, 0]).build();

    let err = codec.read_frame(&mut reader).await.unwrap_err();
    assert!(matches!(
        err,
        CodecError::ShortRead {
            expected: 4,
            received: 2
        }
    ));
}

#[tokio::test]
async fn test_legacy_prefix_smaller_than_itself_rejected() {
    let codec = Codec::new(ProtocolGeneration::Legacy);
    let mut reader = Builder::new().read(&2u32.to_be_bytes()).build();

    let err = codec.read_frame(&mut reader).await.unwrap_err();
    assert!(err.is_malformed());
}
