//! Realtime channel: the shared connection, tracking subscriptions and
//! outbound event helpers.

mod backoff;
pub mod connection;
pub mod emit;
pub mod feed;
mod listeners;
pub mod tracking;
pub mod transport;

pub use connection::{Connection, ConnectionError, Listener, TransportState, get_connection};
pub use feed::{Notice, NoticeFeed};
pub use listeners::ListenerId;
pub use tracking::{TrackingScope, TrackingSubscription, join_tracking, leave_tracking};
pub use transport::{Connector, TransportLink, WebSocketConnector};
