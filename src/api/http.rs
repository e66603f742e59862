//! Blocking HTTP client for the notification endpoints.

use super::{parse_snapshot, NotificationApi};
use crate::error::{Result, SyncError};
use crate::types::{Notification, NotificationId};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Supplies the bearer token. Called before every request, so
/// implementations can refresh or rotate tokens.
pub trait TokenSource: Send + Sync {
    /// `None` sends the request without an `Authorization` header.
    fn token(&self) -> Option<String>;
}

/// A token obtained up front by the host.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// [`NotificationApi`] over `reqwest::blocking`.
///
/// Endpoints, relative to `base_url`:
/// `GET /notifications`, `PATCH /notifications/{id}/read`,
/// `POST /notifications/read-all`, `DELETE /notifications/{id}`.
pub struct HttpNotificationApi {
    http: Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
}

impl HttpNotificationApi {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Self::with_client(http, base_url, tokens)
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)
            .map_err(|e| SyncError::Transport(format!("invalid base url {base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(SyncError::Transport(format!(
                "invalid base url {base_url}: cannot hold a path"
            )));
        }
        Ok(Self {
            http,
            base_url: parsed,
            tokens,
        })
    }

    /// `{base_url}/notifications/{segments..}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Transport(format!("{} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .push("notifications")
            .extend(segments);
        Ok(url)
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let builder = match self.tokens.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        builder
            .send()
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    /// Map a non-success status to an error. 404 on an item route becomes
    /// [`SyncError::NotFound`].
    fn check(response: Response, id: Option<&NotificationId>) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(SyncError::NotFound(id.clone()));
            }
        }
        let body = response.text().unwrap_or_default();
        Err(SyncError::api(status.as_u16(), body))
    }
}

impl NotificationApi for HttpNotificationApi {
    fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        let response = Self::check(self.send(self.http.get(self.url(&[])?))?, None)?;
        let body: Value = response
            .json()
            .map_err(|e| SyncError::Serialization(format!("notification list: {e}")))?;

        // Bare array, or wrapped as `{"data": [...]}`.
        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(SyncError::Serialization(
                        "notification list is missing a data array".into(),
                    ))
                }
            },
            _ => {
                return Err(SyncError::Serialization(
                    "notification list is not an array".into(),
                ))
            }
        };

        let records = parse_snapshot(items);
        debug!(count = records.len(), "fetched notifications");
        Ok(records)
    }

    fn mark_read(&self, id: &NotificationId) -> Result<()> {
        let url = self.url(&[id.as_str(), "read"])?;
        Self::check(self.send(self.http.patch(url))?, Some(id))?;
        Ok(())
    }

    fn mark_all_read(&self) -> Result<()> {
        Self::check(self.send(self.http.post(self.url(&["read-all"])?))?, None)?;
        Ok(())
    }

    fn delete(&self, id: &NotificationId) -> Result<()> {
        let url = self.url(&[id.as_str()])?;
        Self::check(self.send(self.http.delete(url))?, Some(id))?;
        Ok(())
    }
}
