//! Mock implementations for testing
//!
//! Provides a scripted Transport and a recording Sleeper so the agent can be
//! exercised without sockets or real time.

use crate::agent::{ShutdownTrigger, Sleeper};
use crate::protocol::{Codec, CodecError, Request, Response};
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type Responder = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum InjectedFailure {
    /// Nothing reaches the server
    Connection,
    /// The request is delivered but the response frame is unreadable
    MalformedFrame,
}

/// Mock transport for testing
///
/// Each frame is decoded with the caller's codec, handed to the responder and
/// the response encoded back, so both directions go through the real wire
/// format. Requests failed via [`MockTransport::fail_next`] are not recorded;
/// those answered via [`MockTransport::corrupt_next`] are.
#[derive(Clone)]
pub struct MockTransport {
    responder: Responder,
    script: Arc<Mutex<Option<VecDeque<Response>>>>,
    requests: Arc<Mutex<Vec<Request>>>,
    frames: Arc<Mutex<Vec<Bytes>>>,
    pending_failures: Arc<Mutex<VecDeque<InjectedFailure>>>,
}

impl MockTransport {
    /// Answer every request with `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            script: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
            frames: Arc::new(Mutex::new(Vec::new())),
            pending_failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Answer requests with `responses` in order, then with plain acks
    pub fn scripted(responses: Vec<Response>) -> Self {
        let transport = Self::new(|_| Response::ack());
        Self {
            script: Arc::new(Mutex::new(Some(responses.into()))),
            ..transport
        }
    }

    /// Fail the next `count` round trips with a connection error
    pub async fn fail_next(&self, count: usize) {
        self.inject(InjectedFailure::Connection, count).await;
    }

    /// Deliver the next `count` requests but answer with an oversized frame
    pub async fn corrupt_next(&self, count: usize) {
        self.inject(InjectedFailure::MalformedFrame, count).await;
    }

    async fn inject(&self, failure: InjectedFailure, count: usize) {
        self.pending_failures
            .lock()
            .await
            .extend(std::iter::repeat(failure).take(count));
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.requests.lock().await.clone()
    }

    /// Raw frames as sent, length prefix included
    pub async fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.requests.lock().await.clear();
        self.frames.lock().await.clear();
    }

    async fn respond(&self, request: &Request) -> Response {
        let mut script = self.script.lock().await;
        match script.as_mut() {
            Some(queue) => queue.pop_front().unwrap_or_else(Response::ack),
            None => (self.responder)(request),
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn round_trip(&self, frame: &[u8], codec: &Codec) -> Result<Bytes, TransportError> {
        let failure = self.pending_failures.lock().await.pop_front();
        if let Some(InjectedFailure::Connection) = failure {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock transport failure",
            )));
        }

        let frame = Bytes::copy_from_slice(frame);
        let request = codec.decode_request(&frame[crate::protocol::LENGTH_PREFIX_LEN..])?;
        self.frames.lock().await.push(frame);
        self.requests.lock().await.push(request.clone());

        if let Some(InjectedFailure::MalformedFrame) = failure {
            return Err(TransportError::Frame(CodecError::MalformedPacket(
                "declared frame length exceeds the maximum".to_string(),
            )));
        }

        let response = self.respond(&request).await;
        let encoded = codec.encode_response(&response)?;
        Ok(encoded.slice(crate::protocol::LENGTH_PREFIX_LEN..))
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

/// Sleeper that returns immediately and records what it was asked to do
#[derive(Debug, Clone, Default)]
pub struct MockSleeper {
    durations: Arc<Mutex<Vec<Duration>>>,
    trigger: Option<(usize, ShutdownTrigger)>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `trigger` once `count` sleeps have been recorded
    pub fn trigger_after(mut self, count: usize, trigger: ShutdownTrigger) -> Self {
        self.trigger = Some((count, trigger));
        self
    }

    pub async fn durations(&self) -> Vec<Duration> {
        self.durations.lock().await.clone()
    }

    pub async fn total(&self) -> Duration {
        self.durations.lock().await.iter().sum()
    }
}

#[async_trait]
impl Sleeper for MockSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut durations = self.durations.lock().await;
            durations.push(duration);
            durations.len()
        };
        if let Some((after, trigger)) = &self.trigger {
            if count >= *after {
                trigger.trigger();
            }
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::shutdown_channel;
    use crate::protocol::{ProtocolGeneration, StatusCode};

    fn deregistration(codec: &Codec) -> Bytes {
        codec
            .encode_request(&Request::Deregistration {
                name: "mock".to_string(),
            })
            .unwrap()
            .frame
    }

    #[tokio::test]
    async fn test_mock_transport_records_and_responds() {
        let codec = Codec::new(ProtocolGeneration::Current);
        let transport = MockTransport::new(|_| Response::ack());
        let frame = deregistration(&codec);

        let body = transport.round_trip(&frame, &codec).await.unwrap();
        assert_eq!(codec.decode_response(&body).unwrap(), Response::ack());
        assert_eq!(transport.frames().await, vec![frame]);
        assert_eq!(transport.requests().await.len(), 1);

        transport.clear_history().await;
        assert!(transport.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_responses_then_acks() {
        let codec = Codec::new(ProtocolGeneration::Legacy);
        let transport = MockTransport::scripted(vec![Response::new(
            StatusCode::FailureOther,
            Bytes::new(),
        )]);
        let frame = deregistration(&codec);

        let first = transport.round_trip(&frame, &codec).await.unwrap();
        let second = transport.round_trip(&frame, &codec).await.unwrap();
        assert_eq!(
            codec.decode_response(&first).unwrap().status(),
            StatusCode::FailureOther
        );
        assert_eq!(codec.decode_response(&second).unwrap(), Response::ack());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let codec = Codec::new(ProtocolGeneration::Current);
        let transport = MockTransport::new(|_| Response::ack());
        transport.fail_next(2).await;
        let frame = deregistration(&codec);

        assert!(transport.round_trip(&frame, &codec).await.is_err());
        assert!(transport.round_trip(&frame, &codec).await.is_err());
        assert!(transport.round_trip(&frame, &codec).await.is_ok());
        assert_eq!(transport.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_responses_are_recorded() {
        let codec = Codec::new(ProtocolGeneration::Current);
        let transport = MockTransport::new(|_| Response::ack());
        transport.corrupt_next(1).await;
        let frame = deregistration(&codec);

        let err = transport.round_trip(&frame, &codec).await.unwrap_err();
        assert!(matches!(err, TransportError::Frame(ref e) if e.is_malformed()));
        assert!(transport.round_trip(&frame, &codec).await.is_ok());
        assert_eq!(transport.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_sleeper_records_and_triggers() {
        let (trigger, signal) = shutdown_channel();
        let sleeper = MockSleeper::new().trigger_after(2, trigger);

        sleeper.sleep(Duration::from_millis(5)).await;
        assert!(!signal.is_triggered());
        sleeper.sleep(Duration::from_millis(7)).await;
        assert!(signal.is_triggered());

        assert_eq!(
            sleeper.durations().await,
            vec![Duration::from_millis(5), Duration::from_millis(7)]
        );
        assert_eq!(sleeper.total().await, Duration::from_millis(12));
    }
}
