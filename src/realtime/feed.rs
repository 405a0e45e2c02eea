//! Rolling feed of dashboard notices (announcements, bookings, assignments).

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::watch;
use wire::events::{AGENT_ASSIGNED, PARCEL_BOOKED, Priority, SYSTEM_ANNOUNCEMENT};

use super::connection::{Connection, Listener};

pub const DEFAULT_FEED_CAPACITY: usize = 50;

/// Events shown on the admin dashboard.
pub const ADMIN_FEED_EVENTS: [&str; 3] = [SYSTEM_ANNOUNCEMENT, PARCEL_BOOKED, AGENT_ASSIGNED];

#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    /// Position in the feed, starting at 1; keeps counting after old
    /// notices are dropped.
    pub seq: u64,
    pub event: String,
    pub message: String,
    pub priority: Priority,
    pub received_at: OffsetDateTime,
}

impl Notice {
    fn from_event(event: &str, data: &Value) -> Self {
        let text = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or_default().to_owned();
        let message = match event {
            PARCEL_BOOKED => format!(
                "Parcel {} booked: {} to {}",
                text("trackingNumber"),
                text("pickupCity"),
                text("deliveryCity")
            ),
            AGENT_ASSIGNED => format!("{} assigned to parcel {}", text("agentName"), text("parcelId")),
            _ => text("message"),
        };
        let priority = data
            .get("priority")
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or_default();
        Self {
            seq: 0,
            event: event.to_owned(),
            message,
            priority,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Newest notices last, oldest dropped beyond `capacity`.
pub struct NoticeFeed {
    notices: Arc<watch::Sender<VecDeque<Notice>>>,
    _listeners: Vec<Listener>,
}

impl NoticeFeed {
    #[must_use]
    pub fn open(connection: &Connection) -> Self {
        Self::open_with(connection, &ADMIN_FEED_EVENTS, DEFAULT_FEED_CAPACITY)
    }

    #[must_use]
    pub fn open_with(connection: &Connection, events: &[&'static str], capacity: usize) -> Self {
        let (notices, _) = watch::channel(VecDeque::<Notice>::with_capacity(capacity));
        let notices = Arc::new(notices);
        let listeners = events
            .iter()
            .map(|&event| {
                let notices = Arc::clone(&notices);
                connection.listen(event, move |data| {
                    let mut notice = Notice::from_event(event, data);
                    notices.send_modify(|feed| {
                        notice.seq = feed.back().map_or(1, |last| last.seq + 1);
                        feed.push_back(notice);
                        while feed.len() > capacity {
                            feed.pop_front();
                        }
                    });
                })
            })
            .collect();
        Self {
            notices,
            _listeners: listeners,
        }
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().iter().cloned().collect()
    }

    /// Notices in `feed` newer than `seq`, oldest first.
    pub fn newer_than(feed: &VecDeque<Notice>, seq: u64) -> impl Iterator<Item = &Notice> {
        feed.iter().filter(move |notice| notice.seq > seq)
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<VecDeque<Notice>> {
        self.notices.subscribe()
    }
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
