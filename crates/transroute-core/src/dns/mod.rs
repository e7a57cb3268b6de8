//! Transparent DNS relay
//!
//! Queries arriving on the listener are forwarded one by one to an upstream
//! resolver, either a fixed one or the destination the client originally
//! targeted before a redirect rule captured the datagram. A-record answers
//! are harvested into the hostname cache on the way back.

mod harvest;
mod relay;
mod server;

pub use harvest::AnswerHarvester;
pub use relay::{reply_size, MarkedSocketRelay, MIN_UDP_SIZE, RELAY_TIMEOUT};
pub use server::{DnsRelayServer, QueryHandler, UpstreamMode};

use crate::error::Result;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder, EncodeMode};

/// SERVFAIL reply to `query`
///
/// Keeps the id, opcode, questions and recursion-desired bit of the query.
pub fn failure_response(query: &Message) -> Message {
    let mut reply = Message::error_msg(query.id(), query.op_code(), ResponseCode::ServFail);
    reply.add_queries(query.queries().iter().cloned());
    reply.set_recursion_desired(query.recursion_desired());
    reply
}

/// Encode `message` with name compression
pub fn encode_compressed(message: &Message) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(MIN_UDP_SIZE);
    {
        let mut encoder = BinEncoder::with_mode(&mut buf, EncodeMode::Normal);
        encoder.set_canonical_names(false);
        message.emit(&mut encoder)?;
    }
    Ok(buf)
}
