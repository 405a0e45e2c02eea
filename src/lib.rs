//! Realtime parcel-tracking client for the CourierHub courier platform.
//!
//! SYSTEM CONTEXT
//! ==============
//! Customers, delivery agents and admins share one realtime connection per
//! process. Views open tracking subscriptions on it and render the
//! reconciled [`state::TrackingView`]; role actions persist through the REST
//! API and then notify other live subscribers over the same connection.
//!
//! - [`config`]: environment-driven client configuration
//! - [`session`]: process-wide token and user identity
//! - [`api`]: REST client, the source of truth
//! - [`realtime`]: connection, subscriptions and emission helpers
//! - [`state`]: event reconciliation into view models
//! - [`actions`]: persist-then-notify role flows

pub mod actions;
pub mod api;
pub mod config;
pub mod realtime;
pub mod session;
pub mod state;

pub use actions::{ActionError, Actions};
pub use api::{ApiClient, ApiError, Parcel};
pub use config::ClientConfig;
pub use realtime::{Connection, TrackingScope, TrackingSubscription, get_connection};
pub use state::TrackingView;
