//! Client side of the pothole line protocol.
//!
//! This module holds the transport used to exchange request and response lines with a
//! pothole server, and the parsers that turn raw response lines into typed values.
//!
//! # Overview
//!
//! Every message is one line of UTF-8 text terminated by `\n`. The client writes a request
//! line rendered by [`Request`](crate::Request) and, for commands that have one, reads the
//! response under a bounded timeout. There is no explicit end-of-response marker: a read
//! that times out means nothing (more) arrived, and is not an error.
//!
//! # Key Components
//!
//! - [`LineTransport`]: Owns the socket. Serializes writes, serializes reads, and overrides
//!   the read deadline for a single read.
//! - [`Exchange`]: Request lock held by one logical call across its write and reads.
//! - [`parse_threshold`], [`collect_delimited`], [`parse_envelope`]: Response decoders.
//!
//! # Response Shapes
//!
//! - Scalar: one decimal number, e.g. `25.5`.
//! - Delimited list: one `lat;lon;severity` line per record, ended by a read timeout.
//! - Envelope list: one line `{"potholes": ["<json-record>", ...]}` where each element is
//!   itself a JSON document encoded as a string.
//!
//! Malformed responses never tear the connection down; decoders report them and the
//! caller substitutes a default.
//!
//! # See Also
//!
//! - [`client`](crate::client): Composes requests, transport and parsers per operation.
mod response;
mod transport;

pub use response::{
    ListFormat, ResponseError, collect_delimited, parse_delimited_record, parse_envelope,
    parse_threshold,
};
pub use transport::{Exchange, LINE_TERMINATOR, LineTransport, Socket, TransportError};
