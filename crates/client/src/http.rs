use std::time::{Duration, Instant};

use async_trait::async_trait;
use offerdesk_core::backend::{
    OfferBackend, PendingOffersResponse, SendAck, SendOfferRequest, StatusEntryRecord,
    StatusFeedResponse,
};
use offerdesk_core::config::BackendConfig;
use offerdesk_core::domain::offer::{LineId, Offer, OfferId};
use offerdesk_core::errors::BackendError;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// [`OfferBackend`] over the backend's JSON HTTP API.
pub struct HttpOfferBackend {
    client: Client,
    base_url: Url,
    api_token: Option<SecretString>,
}

impl HttpOfferBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::from_parts(&config.base_url, config.api_token.clone(), config.timeout())
    }

    pub fn from_parts(
        base_url: &str,
        api_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            BackendError::Configuration(format!("invalid base url `{base_url}`: {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Configuration(format!(
                "base url `{base_url}` cannot carry request paths"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("offerdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| BackendError::Configuration(error.to_string()))?;

        Ok(Self { client, base_url, api_token })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BackendError::Configuration(format!(
                    "base url `{}` cannot carry request paths",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&SendOfferRequest>,
    ) -> Result<Response, BackendError> {
        let path = url.path().to_owned();
        let mut builder = self.request(method.clone(), url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(
            event_name = "backend.request.completed",
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend request completed"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = error_payload(&body);
        Err(BackendError::Rejected { status: status.as_u16(), code, message })
    }
}

#[async_trait]
impl OfferBackend for HttpOfferBackend {
    async fn pending_offers(&self) -> Result<Vec<Offer>, BackendError> {
        let url = self.endpoint(&["pending-offers"])?;
        let response = self.execute(Method::GET, url, None).await?;
        let payload: PendingOffersResponse = decode_or_default(response).await?;
        Ok(payload.offers)
    }

    async fn offer_statuses(&self) -> Result<Vec<StatusEntryRecord>, BackendError> {
        let url = self.endpoint(&["offers-status"])?;
        let response = self.execute(Method::GET, url, None).await?;
        let payload: StatusFeedResponse = decode_or_default(response).await?;
        Ok(payload.offers)
    }

    async fn offer(&self, offer_id: &OfferId) -> Result<Offer, BackendError> {
        let url = self.endpoint(&["offers", offer_id.0.as_str()])?;
        let response = self.execute(Method::GET, url, None).await?;
        decode(response).await
    }

    async fn send_offer(
        &self,
        offer_id: &OfferId,
        line_ids: &[LineId],
    ) -> Result<SendAck, BackendError> {
        let url = self.endpoint(&["offers", offer_id.0.as_str(), "send"])?;
        let body = SendOfferRequest { line_ids: line_ids.to_vec() };
        let response = self.execute(Method::POST, url, Some(&body)).await?;
        decode_or_default(response).await
    }

    async fn delete_offer(&self, offer_id: &OfferId) -> Result<(), BackendError> {
        let url = self.endpoint(&["offers", offer_id.0.as_str()])?;
        self.execute(Method::DELETE, url, None).await?;
        Ok(())
    }
}

fn transport_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Transport(format!("request timed out: {error}"))
    } else {
        BackendError::Transport(error.to_string())
    }
}

async fn body_bytes(response: Response) -> Result<Vec<u8>, BackendError> {
    response.bytes().await.map(|bytes| bytes.to_vec()).map_err(transport_error)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let bytes = body_bytes(response).await?;
    serde_json::from_slice(&bytes).map_err(|error| BackendError::Decode(error.to_string()))
}

/// Like [`decode`], but an empty body yields `T::default()`.
async fn decode_or_default<T: DeserializeOwned + Default>(
    response: Response,
) -> Result<T, BackendError> {
    let bytes = body_bytes(response).await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|error| BackendError::Decode(error.to_string()))
}

/// Extracts `(code, message)` from an error body.
///
/// The message is read from `message`, then `detail`, then `error`; a non-JSON body is
/// taken verbatim.
fn error_payload(body: &str) -> (Option<String>, Option<String>) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, None);
    }

    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(trimmed) else {
        return (None, Some(trimmed.to_owned()));
    };

    let code = match fields.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    let message = ["message", "detail", "error"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::to_owned);
    (code, message)
}

#[cfg(test)]
mod tests {
    use super::error_payload;

    #[test]
    fn error_payload_prefers_message_then_aliases() {
        assert_eq!(
            error_payload(r#"{"code":"erp_locked","message":"locked","detail":"ignored"}"#),
            (Some("erp_locked".to_owned()), Some("locked".to_owned()))
        );
        assert_eq!(
            error_payload(r#"{"detail":"Offer not found"}"#),
            (None, Some("Offer not found".to_owned()))
        );
        assert_eq!(error_payload(r#"{"error":"boom","code":503}"#).0, Some("503".to_owned()));
    }

    #[test]
    fn error_payload_keeps_plain_text_bodies() {
        assert_eq!(error_payload("Bad Gateway\n"), (None, Some("Bad Gateway".to_owned())));
        assert_eq!(error_payload("   "), (None, None));
    }
}
