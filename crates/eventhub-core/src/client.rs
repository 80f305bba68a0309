use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::{EventId, EventRecord, NewEvent};
use crate::rsvp::{Rsvp, RsvpStatus};
use crate::session::{Session, User};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not logged in or session expired; please login again")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("{method} {path} failed ({status}): {message}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
        message: String,
    },

    #[error("request to {path} failed")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {path}: {detail}")]
    Decode { path: String, detail: String },

    #[error("failed reading image {path}")]
    Image {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// The backend's `error` message, when the failure carried one.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_duplicate_entry(&self) -> bool {
        self.message() == Some("Duplicate entry")
    }
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

impl Registration {
    pub fn new(name: String, email: String, password: String) -> Self {
        Self {
            name,
            email,
            password,
            role: "user".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: User,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    event: Option<EventRecord>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Blocking client for the campus events backend. One request per call, no
/// retries.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
    cookie: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, session: &Session) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed building HTTP client for events backend")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            cookie: session.cookie.clone(),
        })
    }

    /// Raw `/events` payload; records are validated one by one by the caller.
    #[tracing::instrument(skip(self))]
    pub fn list_events(&self) -> Result<Vec<Value>, ApiError> {
        self.get_json("/events")
    }

    #[tracing::instrument(skip(self), fields(event_id = %id))]
    pub fn get_event(&self, id: &EventId) -> Result<EventRecord, ApiError> {
        self.get_json(&format!("/event/{id}"))
    }

    #[tracing::instrument(skip(self), fields(event_id = %id))]
    pub fn list_rsvps(&self, id: &EventId) -> Result<Vec<Rsvp>, ApiError> {
        self.get_json(&format!("/event/{id}/rsvps"))
    }

    #[tracing::instrument(skip(self), fields(event_id = %id, status = %status))]
    pub fn submit_rsvp(&self, id: &EventId, status: RsvpStatus) -> Result<(), ApiError> {
        let path = format!("/event/{id}/rsvp");
        let request = self
            .request(Method::POST, &path)
            .json(&Rsvp { status });
        self.send(Method::POST, &path, request)?;
        Ok(())
    }

    /// Multipart upload of the create-event form, image included when given.
    #[tracing::instrument(skip(self, event), fields(title = %event.title))]
    pub fn create_event(&self, event: &NewEvent) -> Result<EventRecord, ApiError> {
        let path = "/createEvent";
        let mut form = multipart::Form::new()
            .text("title", event.title.clone())
            .text("description", event.description.clone())
            .text("organizer", event.organizer.clone())
            .text("date", event.date.format("%Y-%m-%d").to_string())
            .text("time", event.time.clone())
            .text("location", event.location.clone())
            .text("category", event.category.as_str().to_string());

        if let Some(image) = &event.image {
            form = attach_image(form, image)?;
        }

        let request = self.request(Method::POST, path).multipart(form);
        let response = self.send(Method::POST, path, request)?;
        let created: CreatedEvent = decode(path, response)?;

        created.event.ok_or_else(|| ApiError::Decode {
            path: path.to_string(),
            detail: "response did not include the created event".to_string(),
        })
    }

    #[tracing::instrument(skip(self), fields(event_id = %id))]
    pub fn delete_event(&self, id: &EventId) -> Result<(), ApiError> {
        let path = format!("/event/{id}");
        let request = self.request(Method::DELETE, &path);
        self.send(Method::DELETE, &path, request)?;
        Ok(())
    }

    /// Returns the user and the cookies the backend set for the new session.
    #[tracing::instrument(skip(self, password))]
    pub fn login(&self, email: &str, password: &str) -> Result<(User, Option<String>), ApiError> {
        let path = "/login";
        let request = self
            .request(Method::POST, path)
            .json(&Credentials { email, password });
        let response = self.send(Method::POST, path, request)?;

        let cookie = session_cookie(&response);
        let body: LoginResponse = decode(path, response)?;
        info!(email, role = body.user.role.as_str(), "logged in");
        Ok((body.user, cookie))
    }

    #[tracing::instrument(skip(self, registration), fields(email = %registration.email))]
    pub fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let path = "/register";
        let request = self.request(Method::POST, path).json(registration);
        self.send(Method::POST, path, request)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn logout(&self) -> Result<(), ApiError> {
        let path = "/logout";
        let request = self.request(Method::POST, path);
        self.send(Method::POST, path, request)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path);
        let response = self.send(Method::GET, path, request)?;
        decode(path, response)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let request = self.http.request(method, url);
        match &self.cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        debug!(%method, path, "sending request");
        let response = request.send().map_err(|source| ApiError::Transport {
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        warn!(%method, path, %status, "backend rejected request");
        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            _ => {
                let body = response.text().unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&body)
                    .ok()
                    .and_then(|body| body.error)
                    .unwrap_or_else(|| {
                        status
                            .canonical_reason()
                            .unwrap_or("request failed")
                            .to_string()
                    });
                Err(ApiError::Status {
                    method,
                    path: path.to_string(),
                    status,
                    message,
                })
            }
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
    let body = response.text().map_err(|source| ApiError::Transport {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|err| ApiError::Decode {
        path: path.to_string(),
        detail: err.to_string(),
    })
}

fn attach_image(form: multipart::Form, image: &Path) -> Result<multipart::Form, ApiError> {
    form.file("image", image).map_err(|source| ApiError::Image {
        path: image.display().to_string(),
        source,
    })
}

/// Collapses every `Set-Cookie` header into a single `Cookie` header value.
fn session_cookie(response: &Response) -> Option<String> {
    let pairs = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect::<Vec<_>>();

    (!pairs.is_empty()).then(|| pairs.join("; "))
}
