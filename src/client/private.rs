use async_trait::async_trait;
use log::trace;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// The transport every Spotify call goes through.
///
/// `reqwest::Client` implements this; the client is generic over it so the request flow can be exercised without a
/// network.
#[async_trait]
pub trait HttpClient: Clone + Send + Sync + 'static {
    /// POST an `application/x-www-form-urlencoded` body with the given `Authorization` header value.
    async fn post_form(&self, url: &str, authorization: &str, form: &[(&str, &str)]) -> Result<RawResponse>;

    /// GET with a bearer token.
    async fn get_with_bearer(&self, url: &str, access_token: &str) -> Result<RawResponse>;
}

/// A fully read response: its status and its body as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    status: StatusCode,
    body: String,
}

impl RawResponse {
    pub fn new<S>(status: StatusCode, body: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_body(self) -> String {
        self.body
    }

    pub fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The body as JSON if it is JSON, otherwise the raw text as a JSON string.
    pub fn details(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }

    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let body = response.text().await?;
        trace!("Read {} response with {} byte body", status, body.len());

        Ok(Self { status, body })
    }
}

#[async_trait]
impl HttpClient for reqwest::Client {
    async fn post_form(&self, url: &str, authorization: &str, form: &[(&str, &str)]) -> Result<RawResponse> {
        let response = self
            .post(url)
            .header(header::AUTHORIZATION, authorization)
            .form(form)
            .send()
            .await?;

        RawResponse::read(response).await
    }

    async fn get_with_bearer(&self, url: &str, access_token: &str) -> Result<RawResponse> {
        let response = self.get(url).bearer_auth(access_token).send().await?;
        RawResponse::read(response).await
    }
}
