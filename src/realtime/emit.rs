//! Fire-and-forget constructors for outbound events.
//!
//! Each helper builds one fixed-shape payload and queues it on the
//! connection. None of them report failure: the event only notifies other
//! live subscribers, and the fact itself is persisted through REST.

use wire::events::{
    AgentAssigned, BroadcastAnnouncement, DeliveryCompleted, LocationUpdate, OutboundEvent, ParcelBooked,
    ParcelStatus, Priority, StatusUpdate, UserLogin,
};

use super::connection::Connection;
use crate::api::Parcel;

pub fn user_login(connection: &Connection, user_id: &str) {
    connection.emit(&OutboundEvent::UserLogin(UserLogin {
        user_id: user_id.to_owned(),
    }));
}

pub fn update_location(connection: &Connection, parcel_id: &str, latitude: f64, longitude: f64, agent_id: &str) {
    connection.emit(&OutboundEvent::LocationUpdate(LocationUpdate {
        parcel_id: parcel_id.to_owned(),
        latitude,
        longitude,
        agent_id: agent_id.to_owned(),
    }));
}

/// `previous_status` is sent as `null` when unknown.
pub fn update_status(
    connection: &Connection,
    parcel_id: &str,
    status: ParcelStatus,
    previous_status: Option<ParcelStatus>,
    agent_id: &str,
) {
    connection.emit(&OutboundEvent::StatusUpdate(StatusUpdate {
        parcel_id: parcel_id.to_owned(),
        status,
        previous_status,
        agent_id: agent_id.to_owned(),
    }));
}

pub fn delivery_completed(connection: &Connection, parcel_id: &str, status: ParcelStatus) {
    connection.emit(&OutboundEvent::DeliveryCompleted(DeliveryCompleted {
        parcel_id: parcel_id.to_owned(),
        status,
    }));
}

pub fn broadcast_announcement(connection: &Connection, message: &str, priority: Priority) {
    connection.emit(&OutboundEvent::BroadcastAnnouncement(BroadcastAnnouncement {
        message: message.to_owned(),
        priority,
    }));
}

pub fn parcel_booked(connection: &Connection, parcel: &Parcel) {
    connection.emit(&OutboundEvent::ParcelBooked(ParcelBooked {
        parcel_id: parcel.id.clone(),
        tracking_number: parcel.tracking_number.clone(),
        pickup_city: parcel.pickup_city.clone(),
        delivery_city: parcel.delivery_city.clone(),
    }));
}

/// Announce a new assignment; city fields come from the assigned parcel.
pub fn agent_assigned(connection: &Connection, parcel: &Parcel, agent_id: &str, agent_name: &str) {
    connection.emit(&OutboundEvent::AgentAssigned(AgentAssigned {
        parcel_id: parcel.id.clone(),
        agent_id: agent_id.to_owned(),
        agent_name: agent_name.to_owned(),
        pickup_city: parcel.pickup_city.clone(),
        delivery_city: parcel.delivery_city.clone(),
    }));
}

#[cfg(test)]
#[path = "emit_test.rs"]
mod tests;
