//! Scripted in-memory request host.
//!
//! Every request replays the same script of lifecycle events from a spawned
//! task. In chunked mode events go through the registered handlers; in
//! atomic mode they are folded into a single completion.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use connectrpc_chunked_client::{
    ChunkHandler, Completion, HeadersHandler, HeadersReceived, HostError, HostRequest,
    RequestHost, RequestSuccess, RequestTask,
};
use connectrpc_chunked_core::{Envelope, encode_envelopes};
use http::{HeaderMap, HeaderName, HeaderValue};
use prost::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    pub text: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct EchoReply {
    #[prost(string, tag = "1")]
    pub text: String,
}

pub fn request(text: &str) -> EchoRequest {
    EchoRequest {
        text: text.to_string(),
    }
}

/// Protobuf-encoded message frame.
pub fn proto_frame(text: &str) -> Envelope {
    Envelope::message(EchoReply {
        text: text.to_string(),
    }
    .encode_to_vec())
}

/// JSON-encoded message frame.
pub fn json_frame(text: &str) -> Envelope {
    Envelope::message(format!(r#"{{"text":"{text}"}}"#))
}

pub fn body(frames: &[Envelope]) -> Bytes {
    Bytes::from(encode_envelopes(frames).unwrap())
}

pub fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    map
}

/// Split `data` into chunks of at most `size` bytes.
pub fn chunked(data: &[u8], size: usize) -> Vec<HostEvent> {
    data.chunks(size)
        .map(|c| HostEvent::Chunk(Bytes::copy_from_slice(c)))
        .collect()
}

/// Route library logs to the test output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub enum HostEvent {
    Headers(u16, HeaderMap),
    Chunk(Bytes),
    Success,
    Fail(HostError),
}

#[derive(Default)]
struct State {
    requests: Vec<HostRequest>,
    off_headers: usize,
    off_chunk: usize,
    tasks: Vec<JoinHandle<()>>,
}

/// A host that replays a fixed script for every request.
#[derive(Clone, Default)]
pub struct MockHost {
    script: Arc<Vec<HostEvent>>,
    state: Arc<Mutex<State>>,
}

impl MockHost {
    pub fn new(script: Vec<HostEvent>) -> Self {
        init_tracing();
        Self {
            script: Arc::new(script),
            state: Arc::default(),
        }
    }

    /// Requests issued so far.
    pub fn requests(&self) -> Vec<HostRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// `(off_headers_received, off_chunk_received)` call counts.
    pub fn off_calls(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.off_headers, state.off_chunk)
    }

    /// Wait until every scripted replay has finished.
    pub async fn settle(&self) {
        let tasks = std::mem::take(&mut self.state.lock().unwrap().tasks);
        for task in tasks {
            task.await.unwrap();
        }
    }
}

#[derive(Default)]
struct Handlers {
    headers: Mutex<Option<HeadersHandler>>,
    chunk: Mutex<Option<ChunkHandler>>,
    registered: Notify,
}

impl Handlers {
    fn both_registered(&self) -> bool {
        self.headers.lock().unwrap().is_some() && self.chunk.lock().unwrap().is_some()
    }
}

struct MockTask {
    handlers: Arc<Handlers>,
    state: Arc<Mutex<State>>,
}

impl RequestTask for MockTask {
    fn on_headers_received(&self, handler: HeadersHandler) {
        *self.handlers.headers.lock().unwrap() = Some(handler);
        self.handlers.registered.notify_one();
    }

    fn on_chunk_received(&self, handler: ChunkHandler) {
        *self.handlers.chunk.lock().unwrap() = Some(handler);
        self.handlers.registered.notify_one();
    }

    fn off_headers_received(&self) {
        self.handlers.headers.lock().unwrap().take();
        self.state.lock().unwrap().off_headers += 1;
    }

    fn off_chunk_received(&self) {
        self.handlers.chunk.lock().unwrap().take();
        self.state.lock().unwrap().off_chunk += 1;
    }
}

impl RequestHost for MockHost {
    fn request(&self, request: HostRequest, complete: Completion) -> Box<dyn RequestTask> {
        let chunked = request.enable_chunked;
        self.state.lock().unwrap().requests.push(request);

        let handlers = Arc::new(Handlers::default());
        let script = self.script.clone();
        let replay = tokio::spawn({
            let handlers = handlers.clone();
            async move {
                if chunked {
                    replay_chunked(&script, &handlers, complete).await;
                } else {
                    replay_atomic(&script, complete);
                }
            }
        });
        self.state.lock().unwrap().tasks.push(replay);

        Box::new(MockTask {
            handlers,
            state: self.state.clone(),
        })
    }
}

async fn replay_chunked(script: &[HostEvent], handlers: &Handlers, complete: Completion) {
    while !handlers.both_registered() {
        handlers.registered.notified().await;
    }

    let mut head = HeadersReceived::default();
    let mut complete = Some(complete);
    for event in script {
        match event {
            HostEvent::Headers(status_code, header) => {
                head = HeadersReceived {
                    status_code: *status_code,
                    header: header.clone(),
                    cookies: vec![],
                };
                if let Some(handler) = handlers.headers.lock().unwrap().as_ref() {
                    handler(head.clone());
                }
            }
            HostEvent::Chunk(chunk) => {
                if let Some(handler) = handlers.chunk.lock().unwrap().as_ref() {
                    handler(chunk.clone());
                }
            }
            HostEvent::Success => {
                if let Some(complete) = complete.take() {
                    complete(Ok(RequestSuccess {
                        status_code: head.status_code,
                        header: head.header.clone(),
                        data: Bytes::new(),
                        cookies: vec![],
                    }));
                }
            }
            HostEvent::Fail(error) => {
                if let Some(complete) = complete.take() {
                    complete(Err(error.clone()));
                }
            }
        }
        tokio::task::yield_now().await;
    }
}

fn replay_atomic(script: &[HostEvent], complete: Completion) {
    let mut success = RequestSuccess::default();
    let mut data = BytesMut::new();
    for event in script {
        match event {
            HostEvent::Headers(status_code, header) => {
                success.status_code = *status_code;
                success.header = header.clone();
            }
            HostEvent::Chunk(chunk) => data.extend_from_slice(chunk),
            HostEvent::Success => {
                success.data = data.freeze();
                complete(Ok(success));
                return;
            }
            HostEvent::Fail(error) => {
                complete(Err(error.clone()));
                return;
            }
        }
    }
}
