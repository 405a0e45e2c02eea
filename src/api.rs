//! REST client for the courier backend.
//!
//! Every call attaches `Authorization: Bearer <token>` when the session has a
//! token. Non-2xx responses become [`ApiError::Server`] carrying the body's
//! `message` field so views can show it as a transient notice.
//!
//! ERROR HANDLING
//! ==============
//! REST is the source of truth for parcel state; callers surface failures to
//! the user and never treat them as fatal.

use std::sync::Arc;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wire::events::ParcelStatus;

use crate::config::ClientConfig;
use crate::session::{Session, SessionError, SessionStore, SessionUser};

const FALLBACK_ERROR_MESSAGE: &str = "API Error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Parcel as returned by the REST API. Fields this client does not interpret
/// are kept in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub tracking_number: String,
    pub status: ParcelStatus,
    #[serde(default)]
    pub pickup_city: String,
    #[serde(default)]
    pub delivery_city: String,
    #[serde(default)]
    pub agent_id: Option<Value>,
    #[serde(default)]
    pub current_latitude: Option<f64>,
    #[serde(default)]
    pub current_longitude: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Booking form accepted by `POST /parcels/book`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub pickup_address: String,
    pub pickup_city: String,
    pub delivery_address: String,
    pub delivery_city: String,
    pub parcel_type: String,
    pub weight: f64,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cod_amount: Option<f64>,
    pub shipping_cost: f64,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    user: SessionUser,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    /// Build a client for `config.api_url` reading tokens from `session`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            session,
        })
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Send a JSON request to `endpoint` (relative to the API base URL).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] for transport failures and
    /// [`ApiError::Server`] for non-2xx responses.
    pub async fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let url = Url::parse(&format!("{}{endpoint}", self.base_url)).map_err(|_| ApiError::InvalidUrl(endpoint.to_owned()))?;
        self.send(method, url, &[], body).await
    }

    /// Base URL extended with `segments`, each percent-encoded as one path
    /// segment.
    fn resource_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let invalid = || ApiError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, query: &[(&str, &str)], body: Option<&Value>) -> Result<Value, ApiError> {
        let endpoint = url.path().to_owned();
        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .as_ref()
                .and_then(|b| b.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| FALLBACK_ERROR_MESSAGE.to_owned(), str::to_owned);
            tracing::debug!(%method, %endpoint, status = status.as_u16(), %message, "api request failed");
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<Value>().await?)
    }

    // =========================================================================
    // AUTH
    // =========================================================================

    /// Exchange credentials for a token and store the resulting session.
    ///
    /// # Errors
    ///
    /// Returns the server's message on bad credentials, or a session error if
    /// the session cannot be persisted.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self.request(Method::POST, "/auth/login", Some(&body)).await?;
        let login: LoginResponse = serde_json::from_value(response)?;
        let session = Session {
            token: Some(login.token),
            user: Some(login.user),
        };
        self.session.set(session.clone())?;
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns the server's message when registration is refused.
    pub async fn register(&self, form: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, "/auth/register", Some(form)).await
    }

    // =========================================================================
    // CUSTOMER
    // =========================================================================

    /// # Errors
    ///
    /// Returns transport/server errors or a decode error for unexpected shapes.
    pub async fn my_parcels(&self) -> Result<Vec<Parcel>, ApiError> {
        let response = self.request(Method::GET, "/parcels/my-parcels", None).await?;
        parcels_field(response)
    }

    /// # Errors
    ///
    /// Returns transport/server errors or a decode error for unexpected shapes.
    pub async fn book_parcel(&self, booking: &BookingRequest) -> Result<Parcel, ApiError> {
        let body = serde_json::to_value(booking)?;
        let response = self.request(Method::POST, "/parcels/book", Some(&body)).await?;
        parcel_field(response)
    }

    /// # Errors
    ///
    /// Returns transport/server errors or a decode error for unexpected shapes.
    pub async fn parcel(&self, parcel_id: &str) -> Result<Parcel, ApiError> {
        let url = self.resource_url(&["parcels", parcel_id])?;
        let response = self.send(Method::GET, url, &[], None).await?;
        parcel_field(response)
    }

    /// Look a parcel up by tracking number (the scan flow). `None` when the
    /// server answers without a parcel.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors or a decode error for unexpected shapes.
    pub async fn search_parcel(&self, tracking_number: &str) -> Result<Option<Parcel>, ApiError> {
        let response = self
            .send(
                Method::GET,
                self.resource_url(&["parcels", "search"])?,
                &[("trackingNumber", tracking_number)],
                None,
            )
            .await?;
        match response.get("parcel") {
            None | Some(Value::Null) => Ok(None),
            Some(parcel) => Ok(Some(Parcel::deserialize(parcel)?)),
        }
    }

    // =========================================================================
    // AGENT
    // =========================================================================

    /// Parcels assigned to the signed-in agent, in the API's route order.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors or a decode error for unexpected shapes.
    pub async fn assigned_parcels(&self) -> Result<Vec<Parcel>, ApiError> {
        let response = self.request(Method::GET, "/agents/assigned", None).await?;
        parcels_field(response)
    }

    /// # Errors
    ///
    /// Returns transport/server errors.
    pub async fn update_agent_location(&self, parcel_id: &str, latitude: f64, longitude: f64) -> Result<Value, ApiError> {
        let body = serde_json::json!({ "latitude": latitude, "longitude": longitude });
        let url = self.resource_url(&["agents", parcel_id, "location"])?;
        self.send(Method::PATCH, url, &[], Some(&body)).await
    }

    /// # Errors
    ///
    /// Returns transport/server errors.
    pub async fn complete_delivery(
        &self,
        parcel_id: &str,
        status: ParcelStatus,
        failure_reason: Option<&str>,
    ) -> Result<Value, ApiError> {
        let body = serde_json::json!({ "status": status, "failureReason": failure_reason });
        let url = self.resource_url(&["agents", parcel_id, "complete"])?;
        self.send(Method::PATCH, url, &[], Some(&body)).await
    }

    // =========================================================================
    // ADMIN
    // =========================================================================

    /// # Errors
    ///
    /// Returns transport/server errors.
    pub async fn admin_metrics(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, "/admin/metrics", None).await
    }

    /// # Errors
    ///
    /// Returns transport/server errors or a decode error for unexpected shapes.
    pub async fn admin_parcels(&self) -> Result<Vec<Parcel>, ApiError> {
        let response = self.request(Method::GET, "/admin/parcels", None).await?;
        parcels_field(response)
    }

    /// # Errors
    ///
    /// Returns transport/server errors or a decode error for unexpected shapes.
    pub async fn admin_users(&self) -> Result<Vec<SessionUser>, ApiError> {
        let mut response = self.request(Method::GET, "/admin/users", None).await?;
        let users = response
            .get_mut("users")
            .map(Value::take)
            .ok_or(ApiError::MissingField("users"))?;
        Ok(serde_json::from_value(users)?)
    }

    /// # Errors
    ///
    /// Returns transport/server errors.
    pub async fn assign_agent(&self, parcel_id: &str, agent_id: &str) -> Result<Value, ApiError> {
        let body = serde_json::json!({ "parcelId": parcel_id, "agentId": agent_id });
        self.request(Method::POST, "/admin/assign-agent", Some(&body)).await
    }

    /// # Errors
    ///
    /// Returns transport/server errors.
    pub async fn remove_assignment(&self, parcel_id: &str) -> Result<Value, ApiError> {
        let body = serde_json::json!({ "parcelId": parcel_id });
        self.request(Method::POST, "/admin/remove-assignment", Some(&body))
            .await
    }
}

fn parcel_field(mut response: Value) -> Result<Parcel, ApiError> {
    let parcel = response
        .get_mut("parcel")
        .map(Value::take)
        .ok_or(ApiError::MissingField("parcel"))?;
    Ok(serde_json::from_value(parcel)?)
}

fn parcels_field(mut response: Value) -> Result<Vec<Parcel>, ApiError> {
    let parcels = response
        .get_mut("parcels")
        .map(Value::take)
        .ok_or(ApiError::MissingField("parcels"))?;
    Ok(serde_json::from_value(parcels)?)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
