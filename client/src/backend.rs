//! Credential lookup against the dashboard backend.
//!
//! Every connection attempt starts by asking the backend for a one-time
//! WebSocket endpoint and token for the server being monitored. The backend
//! proxies this to the hosting panel, so the contract here is only
//! `GET {panel_url}/credential/{server_id}` returning a [`Credential`].

use crate::error::TelemetryError;
use reqwest::header::COOKIE;
use reqwest::RequestBuilder;
use shared::Credential;
use std::future::Future;

/// Source of one-time transport credentials, one request per connection attempt
pub trait CredentialSource: Send + Sync + 'static {
    fn fetch_credential(
        &self,
        server_id: &str,
    ) -> impl Future<Output = Result<Credential, TelemetryError>> + Send;
}

/// HTTP credential source backed by the dashboard's REST API
pub struct PanelCredentials {
    http: reqwest::Client,
    panel_url: String,
    session_cookie: Option<String>,
}

impl PanelCredentials {
    pub fn new(panel_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            panel_url: panel_url.trim_end_matches('/').to_string(),
            session_cookie: None,
        }
    }

    /// Forwards the dashboard session so the backend can authorize the request
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn credential_url(&self, server_id: &str) -> String {
        format!("{}/credential/{}", self.panel_url, server_id)
    }
}

impl CredentialSource for PanelCredentials {
    fn fetch_credential(
        &self,
        server_id: &str,
    ) -> impl Future<Output = Result<Credential, TelemetryError>> + Send {
        let mut request = self.http.get(self.credential_url(server_id));
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }

        request_credential(request)
    }
}

async fn request_credential(request: RequestBuilder) -> Result<Credential, TelemetryError> {
    let credential = request
        .send()
        .await?
        .error_for_status()?
        .json::<Credential>()
        .await?;
    Ok(credential)
}
