use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::{Json, Router};
use serde_json::json;

use super::*;
use crate::config::ClientConfig;
use crate::realtime::connection::{Outbox, detached};
use crate::session::{Session, SessionStore, SessionUser};

// =============================================================
// Stub backend
// =============================================================

struct Stub {
    base_url: String,
    completes: Arc<AtomicUsize>,
}

async fn spawn_stub() -> Stub {
    let completes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completes);

    let app = Router::new()
        .route(
            "/api/agents/{id}/location",
            patch(|Path(id): Path<String>, Json(body): Json<Value>| async move {
                if id == "BAD" {
                    return (StatusCode::NOT_FOUND, Json(json!({ "message": "Parcel not found" })));
                }
                (StatusCode::OK, Json(json!({ "parcelId": id, "echo": body })))
            }),
        )
        .route(
            "/api/agents/{id}/complete",
            patch(move |Path(id): Path<String>, Json(body): Json<Value>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "parcelId": id, "echo": body }))
                }
            }),
        )
        .route(
            "/api/parcels/book",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "parcel": {
                        "_id": "P5",
                        "trackingNumber": "CH555",
                        "status": "pending",
                        "pickupCity": body["pickupCity"],
                        "deliveryCity": body["deliveryCity"]
                    }
                }))
            }),
        )
        .route(
            "/api/admin/assign-agent",
            post(|Json(body): Json<Value>| async move { Json(json!({ "ok": true, "echo": body })) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Stub {
        base_url: format!("http://{addr}/api"),
        completes,
    }
}

fn actions(base_url: &str, user_id: Option<&str>) -> (Actions, Outbox) {
    let session = Session {
        token: user_id.map(|_| "tok".to_owned()),
        user: user_id.map(|id| SessionUser {
            id: id.to_owned(),
            name: "Asha".to_owned(),
            ..SessionUser::default()
        }),
    };
    let store = Arc::new(SessionStore::new(session, None));
    let config = ClientConfig::for_api_url(base_url);
    let (connection, outbox) = detached(config.clone(), Arc::clone(&store));
    let api = ApiClient::new(&config, store).expect("client");
    (Actions::new(api, connection), outbox)
}

fn names(outbox: &mut Outbox) -> Vec<String> {
    outbox.drain().into_iter().map(|(name, _)| name).collect()
}

// =============================================================
// Agent
// =============================================================

#[tokio::test]
async fn share_location_persists_then_emits() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, Some("A1"));

    let response = actions.share_location("P1", 28.70, 77.10).await.expect("share");
    assert_eq!(response["echo"]["latitude"], 28.7);

    assert_eq!(
        outbox.drain(),
        vec![(
            "location-update".to_owned(),
            json!({ "parcelId": "P1", "latitude": 28.7, "longitude": 77.1, "agentId": "A1" })
        )]
    );
}

#[tokio::test]
async fn failed_rest_call_emits_nothing() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, Some("A1"));

    let err = actions.share_location("BAD", 1.0, 2.0).await.expect_err("not found");
    assert_eq!(err.to_string(), "Parcel not found");
    assert!(outbox.drain().is_empty());
}

#[tokio::test]
async fn failed_status_requires_reason_before_any_request() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, Some("A1"));

    let err = actions
        .set_status("P1", ParcelStatus::Failed, Some(ParcelStatus::InTransit), Some("  "))
        .await
        .expect_err("reason required");
    assert!(matches!(err, ActionError::MissingFailureReason));
    assert_eq!(stub.completes.load(Ordering::SeqCst), 0);
    assert!(outbox.drain().is_empty());
}

#[tokio::test]
async fn terminal_status_also_emits_delivery_completed() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, Some("A1"));

    let response = actions
        .set_status("P1", ParcelStatus::Failed, Some(ParcelStatus::InTransit), Some("Recipient absent"))
        .await
        .expect("status");
    assert_eq!(response["echo"]["failureReason"], "Recipient absent");

    let sent = outbox.drain();
    assert_eq!(
        sent[0],
        (
            "status-update".to_owned(),
            json!({ "parcelId": "P1", "status": "failed", "previousStatus": "in-transit", "agentId": "A1" })
        )
    );
    assert_eq!(
        sent[1],
        ("delivery-completed".to_owned(), json!({ "parcelId": "P1", "status": "failed" }))
    );
}

#[tokio::test]
async fn progress_status_emits_status_update_only() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, Some("A1"));

    let response = actions
        .set_status("P1", ParcelStatus::InTransit, Some(ParcelStatus::PickedUp), Some("ignored"))
        .await
        .expect("status");
    assert_eq!(response["echo"]["failureReason"], Value::Null);
    assert_eq!(names(&mut outbox), vec!["status-update"]);
    assert_eq!(stub.completes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn agent_actions_need_a_session_user() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, None);

    let err = actions.share_location("P1", 1.0, 2.0).await.expect_err("signed out");
    assert!(matches!(err, ActionError::NotSignedIn));
    assert!(outbox.drain().is_empty());
}

// =============================================================
// Customer / admin
// =============================================================

#[tokio::test]
async fn booking_emits_parcel_booked_with_server_ids() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, Some("C1"));

    let booking = BookingRequest {
        pickup_address: "1 Ring Rd".to_owned(),
        pickup_city: "Delhi".to_owned(),
        delivery_address: "2 FC Rd".to_owned(),
        delivery_city: "Pune".to_owned(),
        parcel_type: "document".to_owned(),
        weight: 0.5,
        payment_method: "prepaid".to_owned(),
        cod_amount: None,
        shipping_cost: 120.0,
    };
    let parcel = actions.book_parcel(&booking).await.expect("book");
    assert_eq!(parcel.id, "P5");

    assert_eq!(
        outbox.drain(),
        vec![(
            "parcel-booked".to_owned(),
            json!({ "parcelId": "P5", "trackingNumber": "CH555", "pickupCity": "Delhi", "deliveryCity": "Pune" })
        )]
    );
}

#[tokio::test]
async fn assignment_emits_agent_assigned() {
    let stub = spawn_stub().await;
    let (actions, mut outbox) = actions(&stub.base_url, Some("ADM"));
    let parcel: Parcel = serde_json::from_value(json!({
        "_id": "P1",
        "status": "pending",
        "pickupCity": "Delhi",
        "deliveryCity": "Agra"
    }))
    .expect("parcel");

    let response = actions.assign_agent(&parcel, "A1", "Asha").await.expect("assign");
    assert_eq!(response["echo"], json!({ "parcelId": "P1", "agentId": "A1" }));

    let sent = outbox.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "agent-assigned");
    assert_eq!(sent[0].1["agentName"], "Asha");
    assert_eq!(sent[0].1["deliveryCity"], "Agra");
}

#[test]
fn broadcast_is_emit_only() {
    let (actions, mut outbox) = {
        let store = Arc::new(SessionStore::new(Session::default(), None));
        let config = ClientConfig::default();
        let (connection, outbox) = detached(config.clone(), Arc::clone(&store));
        (Actions::new(ApiClient::new(&config, store).expect("client"), connection), outbox)
    };

    actions.broadcast("Depot closed", Priority::Warning);
    assert_eq!(
        outbox.drain(),
        vec![(
            "broadcast-announcement".to_owned(),
            json!({ "message": "Depot closed", "priority": "warning" })
        )]
    );
}
