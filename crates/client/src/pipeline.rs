//! Request pipeline: describes requests and attaches the bearer credential
//!
//! Requests are kept as plain [`ApiRequest`] values and turned into a
//! `reqwest` request on every attempt, so a replay after a token refresh
//! sends the same method, path, query and body with a different bearer.

use crate::error::ClientError;
use crate::types::FileUpload;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, header};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Body of an [`ApiRequest`]
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// One field of a multipart form
#[derive(Debug, Clone)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, file: FileUpload },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(name: impl Into<String>, file: FileUpload) -> Self {
        Self::File {
            name: name.into(),
            file,
        }
    }
}

/// A replayable API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a multipart body
    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Add query parameters from a serializable struct. `None` fields are skipped.
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Result<Self, ClientError> {
        match serde_json::to_value(params)? {
            Value::Object(map) => {
                for (key, value) in map {
                    match value {
                        Value::Null => {}
                        Value::String(s) => self.query.push((key, s)),
                        other => self.query.push((key, other.to_string())),
                    }
                }
                Ok(self)
            }
            Value::Null => Ok(self),
            _ => Err(ClientError::Configuration(
                "query parameters must serialize to an object".into(),
            )),
        }
    }
}

/// Explicit retry state carried alongside one logical request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryContext {
    refreshes: u8,
    refresh_exempt: bool,
}

impl RetryContext {
    /// Refresh cycles a single logical request may trigger
    pub const MAX_REFRESHES: u8 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Context for endpoints whose 401 is a domain answer (login, register, refresh)
    pub fn exempt() -> Self {
        Self {
            refreshes: 0,
            refresh_exempt: true,
        }
    }

    /// Context for a request that has already been through a refresh cycle
    pub fn already_retried() -> Self {
        Self {
            refreshes: Self::MAX_REFRESHES,
            refresh_exempt: false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        !self.refresh_exempt && self.refreshes < Self::MAX_REFRESHES
    }

    pub fn mark_retried(&mut self) {
        self.refreshes = self.refreshes.saturating_add(1);
    }

    pub fn refreshes(&self) -> u8 {
        self.refreshes
    }
}

/// Builds and dispatches requests against the API base URL
#[derive(Clone)]
pub struct RequestPipeline {
    client: Client,
    base_url: String,
}

impl RequestPipeline {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request, attaching `Authorization: Bearer` when a token is given
    pub fn build(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<RequestBuilder, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(token) = access_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        Ok(builder)
    }

    /// Send one attempt of `request`
    pub async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<Response, ClientError> {
        debug!(
            method = %request.method,
            path = %request.path,
            authenticated = access_token.is_some(),
            "Dispatching request"
        );
        let response = self.build(request, access_token)?.send().await?;
        debug!(status = response.status().as_u16(), path = %request.path, "Response received");
        Ok(response)
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form, ClientError> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File { name, file } => {
                let mut body = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
                if let Some(content_type) = &file.content_type {
                    body = body.mime_str(content_type)?;
                }
                form.part(name.clone(), body)
            }
        };
    }
    Ok(form)
}
