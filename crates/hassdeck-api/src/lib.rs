//! Async client for the Home Assistant WebSocket API.
//!
//! One [`Channel`] owns one physical socket: it dials the hub, answers the
//! `auth_required` handshake, waits for the hub to report `RUNNING`, and
//! then exposes a fire-and-forget [`Channel::send`] plus a correlated
//! [`Channel::send_and_receive`]. Everything that happens on the socket is
//! reported upward as a [`ChannelEvent`] tagged with the socket's
//! generation, so stale sockets can be told apart from the live one.

pub mod channel;
pub mod error;
pub mod frame;
pub mod transport;

pub use channel::{Channel, ChannelEvent};
pub use error::Error;
pub use frame::{Envelope, HubEvent, MessageIds, Reply, Request, StateSnapshot, field_str};
pub use transport::{ChannelConfig, DEFAULT_RETRY_INTERVAL, TlsMode};
