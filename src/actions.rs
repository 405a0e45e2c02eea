//! Role actions that persist through REST and then notify live subscribers.
//!
//! DESIGN
//! ======
//! The REST call is the source of truth and always runs first. The matching
//! realtime event is emitted only after it succeeds, so a failed update never
//! reaches other views. Emission itself is fire-and-forget.

use serde_json::Value;
use wire::events::{ParcelStatus, Priority};

use crate::api::{ApiClient, ApiError, BookingRequest, Parcel};
use crate::realtime::{Connection, emit};

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("no signed-in user")]
    NotSignedIn,
    #[error("a failure reason is required when marking a delivery as failed")]
    MissingFailureReason,
}

#[derive(Clone)]
pub struct Actions {
    api: ApiClient,
    connection: Connection,
}

impl Actions {
    #[must_use]
    pub fn new(api: ApiClient, connection: Connection) -> Self {
        Self { api, connection }
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn user_id(&self) -> Result<String, ActionError> {
        self.api.session().user_id().ok_or(ActionError::NotSignedIn)
    }

    // =========================================================================
    // AGENT
    // =========================================================================

    /// Record the agent's position for a parcel, then emit `location-update`.
    ///
    /// # Errors
    ///
    /// [`ActionError::NotSignedIn`] without a session user, or the REST error.
    pub async fn share_location(&self, parcel_id: &str, latitude: f64, longitude: f64) -> Result<Value, ActionError> {
        let agent_id = self.user_id()?;
        let response = self.api.update_agent_location(parcel_id, latitude, longitude).await?;
        emit::update_location(&self.connection, parcel_id, latitude, longitude, &agent_id);
        tracing::info!(parcel_id, latitude, longitude, "location shared");
        Ok(response)
    }

    /// Move a parcel to `status`, then emit `status-update`, followed by
    /// `delivery-completed` when the status is terminal.
    ///
    /// # Errors
    ///
    /// [`ActionError::MissingFailureReason`] for `failed` without a reason
    /// (checked before any request), [`ActionError::NotSignedIn`], or the
    /// REST error.
    pub async fn set_status(
        &self,
        parcel_id: &str,
        status: ParcelStatus,
        previous_status: Option<ParcelStatus>,
        failure_reason: Option<&str>,
    ) -> Result<Value, ActionError> {
        let failure_reason = failure_reason.map(str::trim).filter(|reason| !reason.is_empty());
        if status == ParcelStatus::Failed && failure_reason.is_none() {
            return Err(ActionError::MissingFailureReason);
        }
        let agent_id = self.user_id()?;

        let reason = if status == ParcelStatus::Failed { failure_reason } else { None };
        let response = self.api.complete_delivery(parcel_id, status, reason).await?;

        emit::update_status(&self.connection, parcel_id, status, previous_status, &agent_id);
        if status.is_terminal() {
            emit::delivery_completed(&self.connection, parcel_id, status);
        }
        tracing::info!(parcel_id, %status, "parcel status updated");
        Ok(response)
    }

    // =========================================================================
    // CUSTOMER
    // =========================================================================

    /// Book a parcel, then emit `parcel-booked`.
    ///
    /// # Errors
    ///
    /// Returns the REST error.
    pub async fn book_parcel(&self, booking: &BookingRequest) -> Result<Parcel, ActionError> {
        let parcel = self.api.book_parcel(booking).await?;
        emit::parcel_booked(&self.connection, &parcel);
        tracing::info!(parcel_id = %parcel.id, tracking_number = %parcel.tracking_number, "parcel booked");
        Ok(parcel)
    }

    // =========================================================================
    // ADMIN
    // =========================================================================

    /// Assign `agent_id` to `parcel`, then emit `agent-assigned`.
    ///
    /// # Errors
    ///
    /// Returns the REST error.
    pub async fn assign_agent(&self, parcel: &Parcel, agent_id: &str, agent_name: &str) -> Result<Value, ActionError> {
        let response = self.api.assign_agent(&parcel.id, agent_id).await?;
        emit::agent_assigned(&self.connection, parcel, agent_id, agent_name);
        tracing::info!(parcel_id = %parcel.id, agent_id, "agent assigned");
        Ok(response)
    }

    /// Send an announcement to every connected user.
    pub fn broadcast(&self, message: &str, priority: Priority) {
        emit::broadcast_announcement(&self.connection, message, priority);
    }
}

#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;
