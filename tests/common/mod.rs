//! Shared test infrastructure for responder integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use cirrid::state::DnsState;
use cirrid::table::NameTable;
use cirrid::ZoneResponder;

// --- Constants ---

pub const ZONE: &str = "ona.im";
pub const ZONE_ADDR: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 1);

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to
/// `ZoneResponder::handle_request()`. The response is serialized via
/// `MessageResponse::destructive_emit()` and stored as raw wire-format bytes,
/// which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

/// A handler whose client has gone away: every send fails.
#[derive(Clone, Copy)]
pub struct ClosedResponseHandler;

#[async_trait]
impl ResponseHandler for ClosedResponseHandler {
    async fn send_response<'a>(
        &mut self,
        _response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client closed"))
    }
}

// --- Table builders ---

/// Publish a table built from `(key, address)` pairs.
pub fn state_with(entries: &[(&str, Ipv4Addr)]) -> DnsState {
    let mut table = NameTable::new();
    for (key, addr) in entries {
        table.put(key, *addr).expect("invalid test key");
    }
    DnsState::with_table(table)
}

/// The `{.ona.im. → 203.0.113.1}` table.
pub fn zone_wildcard_state() -> DnsState {
    state_with(&[(".ona.im", ZONE_ADDR)])
}

/// Client source address for crafted requests.
pub fn test_src() -> SocketAddr {
    "127.0.0.1:53000".parse().unwrap()
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Build wire-format bytes for a query message with no question at all.
pub fn build_empty_query_bytes(id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` from wire bytes.
pub fn build_request_from_bytes(bytes: &[u8], src: SocketAddr) -> Request {
    Request::new(parse_message_request(bytes), src, Protocol::Udp)
}

/// Build a full `Request` for one question.
pub fn build_request(name: &str, record_type: RecordType, src: SocketAddr, id: u16) -> Request {
    build_request_from_bytes(&build_query_bytes(name, record_type, id), src)
}

// --- Response helpers ---

/// Run `request` through the responder and return the parsed response.
pub async fn handle(responder: &ZoneResponder, request: &Request) -> Message {
    let handler = TestResponseHandler::new();
    responder.handle_request(request, handler.clone()).await;
    handler.into_message()
}

/// Execute a query through the responder and return the parsed response.
pub async fn execute_query(
    state: &DnsState,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let responder = ZoneResponder::new(state.clone());
    let request = build_request(name, record_type, test_src(), id);
    handle(&responder, &request).await
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(a.0),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert an authoritative answer with exactly one A record.
pub fn assert_a_answer(msg: &Message, expected: Ipv4Addr) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.header().authoritative(), "answer should be authoritative");
    assert_eq!(extract_a_ips(msg), vec![expected]);
}

/// Assert an empty, non-authoritative NOERROR response.
pub fn assert_empty_answer(msg: &Message) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(
        !msg.header().authoritative(),
        "empty answer must not be authoritative"
    );
    assert!(
        msg.answers().is_empty(),
        "expected no answers, got {:?}",
        msg.answers()
    );
}
