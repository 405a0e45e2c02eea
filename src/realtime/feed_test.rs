use serde_json::json;

use super::*;
use crate::config::ClientConfig;
use crate::realtime::connection::detached;
use crate::session::{Session, SessionStore};

fn connection() -> Connection {
    detached(
        ClientConfig::default(),
        Arc::new(SessionStore::new(Session::default(), None)),
    )
    .0
}

#[test]
fn notices_are_summarised_per_event() {
    let connection = connection();
    let feed = NoticeFeed::open(&connection);

    connection.dispatch(SYSTEM_ANNOUNCEMENT, &json!({ "message": "Depot closed", "priority": "critical" }));
    connection.dispatch(
        PARCEL_BOOKED,
        &json!({ "parcelId": "P1", "trackingNumber": "CH1", "pickupCity": "Delhi", "deliveryCity": "Pune" }),
    );
    connection.dispatch(AGENT_ASSIGNED, &json!({ "parcelId": "P1", "agentName": "Asha" }));

    let notices = feed.notices();
    let messages: Vec<&str> = notices.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["Depot closed", "Parcel CH1 booked: Delhi to Pune", "Asha assigned to parcel P1"]
    );
    assert_eq!(notices[0].priority, Priority::Critical);
    assert_eq!(notices[1].priority, Priority::Info);
}

#[test]
fn feed_keeps_newest_within_capacity() {
    let connection = connection();
    let feed = NoticeFeed::open_with(&connection, &[SYSTEM_ANNOUNCEMENT], 2);

    for n in 1..=3 {
        connection.dispatch(SYSTEM_ANNOUNCEMENT, &json!({ "message": format!("notice {n}") }));
    }

    let messages: Vec<String> = feed.notices().into_iter().map(|n| n.message).collect();
    assert_eq!(messages, vec!["notice 2", "notice 3"]);
}

#[test]
fn dropping_feed_removes_its_listeners() {
    let connection = connection();
    let baseline = connection.listener_count(PARCEL_BOOKED);

    let feed = NoticeFeed::open(&connection);
    assert_eq!(connection.listener_count(PARCEL_BOOKED), baseline + 1);
    drop(feed);
    assert_eq!(connection.listener_count(PARCEL_BOOKED), baseline);
}

#[tokio::test]
async fn burst_between_wakeups_is_not_lost() {
    let connection = connection();
    let feed = NoticeFeed::open_with(&connection, &[SYSTEM_ANNOUNCEMENT], 2);
    let mut watcher = feed.watch();

    for n in 1..=3 {
        connection.dispatch(SYSTEM_ANNOUNCEMENT, &json!({ "message": format!("notice {n}") }));
    }
    watcher.changed().await.expect("feed alive");
    let snapshot = watcher.borrow_and_update().clone();

    let seen: Vec<(u64, &str)> = NoticeFeed::newer_than(&snapshot, 1)
        .map(|n| (n.seq, n.message.as_str()))
        .collect();
    assert_eq!(seen, vec![(2, "notice 2"), (3, "notice 3")]);
    assert_eq!(NoticeFeed::newer_than(&snapshot, 3).count(), 0);
}
