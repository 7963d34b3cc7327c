//! Hickory request handler answering A queries from the published name table.
//!
//! Every query gets NOERROR. A matching A query is answered authoritatively;
//! anything else gets an empty, non-authoritative answer so the client's
//! resolver moves on without caching a negative result.

use async_trait::async_trait;
use hickory_proto::op::{Header, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::Ipv4Addr;
use tracing::{debug, trace, warn};

use crate::metrics::{self, QueryResult, Timer};
use crate::state::DnsState;

/// TTL of every answer, in seconds.
pub const ANSWER_TTL: u32 = 60;

/// What the table says about one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// An A query that matched.
    Address(Ipv4Addr),
    /// An A query for a name not in the table.
    NoMatch,
    /// Not an A query.
    Ignored,
}

impl Answer {
    fn query_result(self) -> QueryResult {
        match self {
            Answer::Address(_) => QueryResult::Answered,
            Answer::NoMatch => QueryResult::NoMatch,
            Answer::Ignored => QueryResult::Ignored,
        }
    }
}

/// Request handler backed by [`DnsState`].
#[derive(Debug, Clone)]
pub struct ZoneResponder {
    state: DnsState,
}

impl ZoneResponder {
    /// Serve whatever table is published in `state`.
    pub fn new(state: DnsState) -> Self {
        Self { state }
    }

    /// Match one question against the current table.
    pub fn answer(&self, name: &Name, rtype: RecordType) -> Answer {
        if rtype != RecordType::A {
            return Answer::Ignored;
        }
        match self.state.snapshot().lookup(&name.to_ascii()) {
            Some(addr) => Answer::Address(addr),
            None => Answer::NoMatch,
        }
    }

    /// A record for `name`, owner kept exactly as queried.
    fn build_a_record(name: &Name, addr: Ipv4Addr) -> Record {
        let mut record = Record::from_rdata(name.clone(), ANSWER_TTL, RData::A(A(addr)));
        record.set_dns_class(DNSClass::IN);
        record
    }
}

#[async_trait]
impl RequestHandler for ZoneResponder {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();
        let mut header = Header::response_from_request(request.header());

        let request_info = match request.request_info() {
            Ok(info) => info,
            Err(e) => {
                debug!(src = %request.src(), error = %e, "request without a usable question");
                metrics::record_query("none", QueryResult::Malformed, timer.elapsed());
                let response = MessageResponseBuilder::from_message_request(request)
                    .error_msg(request.header(), ResponseCode::FormErr);
                return match response_handle.send_response(response).await {
                    Ok(info) => info,
                    Err(e) => {
                        warn!(error = %e, "failed to send DNS response");
                        header.set_response_code(ResponseCode::FormErr);
                        ResponseInfo::from(header)
                    }
                };
            }
        };

        let query = request_info.query.original();
        let name = query.name();
        let rtype = query.query_type();
        trace!(name = %name, rtype = ?rtype, src = %request_info.src, "DNS query");

        let answer = self.answer(name, rtype);
        let mut records = Vec::new();
        match answer {
            Answer::Address(addr) => {
                debug!(name = %name, addr = %addr, "A lookup: answering");
                header.set_authoritative(true);
                records.push(Self::build_a_record(name, addr));
            }
            Answer::NoMatch => {
                debug!(name = %name, "A lookup: no match");
                header.set_authoritative(false);
            }
            Answer::Ignored => {
                trace!(name = %name, rtype = ?rtype, "unsupported record type");
                header.set_authoritative(false);
            }
        }
        header.set_response_code(ResponseCode::NoError);

        let response = MessageResponseBuilder::from_message_request(request).build(
            header,
            records.iter(),
            &[],
            &[],
            &[],
        );

        metrics::record_query(&rtype.to_string(), answer.query_result(), timer.elapsed());

        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                warn!(name = %name, error = %e, "failed to send DNS response");
                ResponseInfo::from(header)
            }
        }
    }
}
