#![doc(html_root_url = "https://docs.rs/nlmux/latest")]
//! Public API for the `nlmux` library.
//!
//! This crate provides an asynchronous client for Linux netlink: a codec for
//! message headers and nested attributes, a socket multiplexer that
//! dispatches inbound messages to stacked listeners, and a request/response
//! client that correlates replies by sequence number.

pub mod byte_order;
pub mod client;
pub mod codec;
pub mod metrics;
pub mod mux;
pub mod request;
pub mod socket;

pub use client::{Client, ClientError};
pub use codec::{Attr, AttrList, CodecError, Encode, Header, Message};
pub use mux::{Listener, ListenerId, Mux, MuxConfig, MuxError};
pub use request::Request;
pub use socket::{Connection, NetlinkSocket, Socket, interface_index};
