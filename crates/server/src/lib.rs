//! Reply side of the courier request/response protocol.
//!
//! A [`Courier`] is built once with its extension chains, encoder, and
//! transport. Each inbound call gets a [`Reply`], which accepts a single
//! payload or error, runs the `onError`/`onSend`/`onResponse` chains, and
//! publishes the encoded envelope to the call's reply destination.

pub mod error;
pub mod events;
pub mod message;
pub mod reply;
pub mod server;
pub mod transport;

pub use {
    error::{Error, Result},
    events::{EventBus, ServerEvent},
    message::{EncodeError, Encoder, JsonEncoder, MessageBuilder},
    reply::Reply,
    server::{Courier, CourierBuilder},
    transport::{Delivery, MemoryTransport, Transport},
};
