//! Client-side view models fed by realtime events.

pub mod tracking;

pub use tracking::{Location, TrackingUpdate, TrackingView, UpdateKind, reconcile, seed};
