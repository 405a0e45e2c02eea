//! Parcel tracking subscriptions.
//!
//! A [`TrackingSubscription`] joins the parcel's room, registers one handler
//! per followed event, and publishes the reconciled [`TrackingView`] through
//! a `watch` channel. Dropping it removes exactly those handlers and leaves
//! the room.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use wire::events::{DELIVERY_FINISHED, LOCATION_UPDATED, OutboundEvent, STATUS_CHANGED, TrackingEvent};

use super::connection::{Connection, Listener};
use crate::api::{ApiClient, ApiError};
use crate::session::Role;
use crate::state::tracking::{self, TrackingView};

/// Emit `join-tracking` for `parcel_id`.
pub fn join_tracking(connection: &Connection, parcel_id: &str) {
    connection.emit(&OutboundEvent::JoinTracking(parcel_id.to_owned()));
}

/// Emit `leave-tracking` for `parcel_id`.
pub fn leave_tracking(connection: &Connection, parcel_id: &str) {
    connection.emit(&OutboundEvent::LeaveTracking(parcel_id.to_owned()));
}

/// Which parcel events a view follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingScope {
    /// Location, status and delivery events (customer tracking page).
    Full,
    /// Status and delivery events only (agent parcel page).
    StatusOnly,
}

impl TrackingScope {
    #[must_use]
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Agent => Self::StatusOnly,
            Role::Customer | Role::Admin => Self::Full,
        }
    }

    #[must_use]
    pub fn event_names(self) -> &'static [&'static str] {
        match self {
            Self::Full => &[LOCATION_UPDATED, STATUS_CHANGED, DELIVERY_FINISHED],
            Self::StatusOnly => &[STATUS_CHANGED, DELIVERY_FINISHED],
        }
    }
}

pub struct TrackingSubscription {
    connection: Connection,
    parcel_id: String,
    view: Arc<watch::Sender<TrackingView>>,
    listeners: Vec<Listener>,
}

impl TrackingSubscription {
    /// Join `parcel_id`'s room and start folding its events into a view.
    #[must_use]
    pub fn open(connection: &Connection, parcel_id: &str, scope: TrackingScope) -> Self {
        let (view, _) = watch::channel(TrackingView::new(parcel_id));
        let view = Arc::new(view);

        connection.retain_room(parcel_id);
        join_tracking(connection, parcel_id);

        let listeners = scope
            .event_names()
            .iter()
            .map(|&name| {
                let view = Arc::clone(&view);
                connection.listen(name, move |data| apply(&view, name, data))
            })
            .collect();

        tracing::debug!(parcel_id, ?scope, "tracking subscription opened");
        Self {
            connection: connection.clone(),
            parcel_id: parcel_id.to_owned(),
            view,
            listeners,
        }
    }

    #[must_use]
    pub fn parcel_id(&self) -> &str {
        &self.parcel_id
    }

    /// Current view.
    #[must_use]
    pub fn view(&self) -> TrackingView {
        self.view.borrow().clone()
    }

    /// Receiver notified after every applied event.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TrackingView> {
        self.view.subscribe()
    }

    /// Fold the REST snapshot of the parcel into the view.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] from fetching the parcel; the view is left
    /// unchanged.
    pub async fn refresh(&self, api: &ApiClient) -> Result<(), ApiError> {
        let parcel = api.parcel(&self.parcel_id).await?;
        self.view
            .send_modify(|view| *view = tracking::seed(std::mem::take(view), &parcel));
        Ok(())
    }
}

impl Drop for TrackingSubscription {
    fn drop(&mut self) {
        self.listeners.clear();
        // The server tracks room membership per socket, not per view.
        if self.connection.release_room(&self.parcel_id) {
            leave_tracking(&self.connection, &self.parcel_id);
        }
        tracing::debug!(parcel_id = %self.parcel_id, "tracking subscription closed");
    }
}

fn apply(view: &watch::Sender<TrackingView>, name: &str, data: &Value) {
    let event = match TrackingEvent::decode(name, data) {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(event = name, error = %e, "dropping malformed tracking event");
            return;
        }
    };

    view.send_if_modified(|current| {
        let before = current.updates.len();
        *current = tracking::reconcile(std::mem::take(current), &event);
        current.updates.len() != before
    });
}

#[cfg(test)]
#[path = "tracking_test.rs"]
mod tests;
