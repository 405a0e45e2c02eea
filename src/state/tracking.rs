//! Per-parcel tracking view and the fold that applies inbound events to it.
//!
//! DESIGN
//! ======
//! [`reconcile`] is a pure function of `(view, event)`. Events for another
//! parcel leave the view untouched; every matching event appends exactly one
//! entry to `updates`, in arrival order, regardless of the payload's own
//! timestamp. [`seed`] folds in a REST snapshot, which only ever touches the
//! current status and location.

use std::fmt;

use time::OffsetDateTime;
use wire::events::{ParcelStatus, TrackingEvent};

use crate::api::Parcel;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    Location,
    Status,
    Delivery,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Location => "location",
            Self::Status => "status",
            Self::Delivery => "delivery",
        })
    }
}

/// One entry of the update log.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackingUpdate {
    pub kind: UpdateKind,
    pub timestamp: OffsetDateTime,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingView {
    pub parcel_id: String,
    pub status: Option<ParcelStatus>,
    /// Last known coordinates.
    pub location: Option<Location>,
    /// Append-only, in arrival order.
    pub updates: Vec<TrackingUpdate>,
}

impl TrackingView {
    #[must_use]
    pub fn new(parcel_id: impl Into<String>) -> Self {
        Self {
            parcel_id: parcel_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn last_update(&self) -> Option<&TrackingUpdate> {
        self.updates.last()
    }
}

/// Apply one inbound event to `view`.
///
/// Payloads without a readable timestamp are stamped with the arrival time.
#[must_use]
pub fn reconcile(mut view: TrackingView, event: &TrackingEvent) -> TrackingView {
    if event.parcel_id() != view.parcel_id {
        return view;
    }
    let stamped = |at: Option<OffsetDateTime>| at.unwrap_or_else(OffsetDateTime::now_utc);

    let update = match event {
        TrackingEvent::LocationUpdated(e) => {
            view.location = Some(Location {
                latitude: e.latitude,
                longitude: e.longitude,
            });
            TrackingUpdate {
                kind: UpdateKind::Location,
                timestamp: stamped(e.timestamp),
                message: format!("Location updated: ({:.2}, {:.2})", e.latitude, e.longitude),
            }
        }
        TrackingEvent::StatusChanged(e) => {
            view.status = Some(e.status);
            TrackingUpdate {
                kind: UpdateKind::Status,
                timestamp: stamped(e.timestamp),
                message: format!("Status changed to: {}", e.status.as_str().to_uppercase()),
            }
        }
        TrackingEvent::DeliveryFinished(e) => {
            view.status = Some(e.status);
            TrackingUpdate {
                kind: UpdateKind::Delivery,
                timestamp: stamped(e.completed_at),
                message: "Delivery completed!".to_owned(),
            }
        }
    };

    view.updates.push(update);
    view
}

/// Overwrite status and location from a REST snapshot of the same parcel.
/// The update log is left alone.
#[must_use]
pub fn seed(mut view: TrackingView, parcel: &Parcel) -> TrackingView {
    if parcel.id != view.parcel_id {
        return view;
    }
    view.status = Some(parcel.status);
    if let (Some(latitude), Some(longitude)) = (parcel.current_latitude, parcel.current_longitude) {
        view.location = Some(Location { latitude, longitude });
    }
    view
}

#[cfg(test)]
#[path = "tracking_test.rs"]
mod tests;
