//! Authenticated REST calls against the Graph API.
//!
//! Every resource wrapper builds a [`CallDescriptor`] and hands it to one
//! shared [`Dispatcher`]:
//!
//! ```text
//! ┌──────────────┐ CallDescriptor ┌────────────┐ bearer ┌──────────────┐
//! │ mail/teams/… │ ─────────────▶ │ Dispatcher │ ─────▶ │  Graph REST  │
//! └──────────────┘                └────────────┘        └──────────────┘
//!                                       │ get_valid_access_token
//!                                       ▼
//!                                 ┌──────────────┐
//!                                 │ TokenManager │
//!                                 └──────────────┘
//! ```
//!
//! A non-2xx status is returned as `GraphError::RemoteCall` and never causes
//! a refresh or retry. Only the stored `expires_on` decides when to refresh.
//!
//! # Usage
//!
//! ```no_run
//! use graph_bridge::dispatch::{CallDescriptor, Dispatcher};
//! # use graph_bridge::token::TokenManager;
//! # use std::sync::Arc;
//!
//! # async fn demo(tokens: Arc<TokenManager>) -> Result<(), graph_bridge::GraphError> {
//! let graph = Dispatcher::new(tokens, "alice");
//!
//! // `{"value": [...]}` envelopes are unwrapped for GET
//! let contacts = graph.get("/me/contacts").await?.into_list();
//!
//! let call = CallDescriptor::post("/me/events", serde_json::json!({ "subject": "Sync" }))
//!     .header("Prefer", "outlook.timezone=\"UTC\"");
//! graph.call(call).await?;
//! # Ok(())
//! # }
//! ```


use crate::error::GraphError;
use crate::token::TokenManager;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Request payload
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Raw bytes sent with an explicit content type (file uploads)
    Raw { content_type: String, bytes: Vec<u8> },
}

/// One outbound call. Built per request, consumed once.
#[derive(Clone, Debug, PartialEq)]
pub struct CallDescriptor {
    pub method: Method,
    /// Path below the REST base (`/me/messages`) or an absolute URL
    pub path: String,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
}

impl CallDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).json(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).json(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).json(body)
    }

    /// PUT of raw bytes, e.g. `/me/drive/root:/a.txt:/content`.
    pub fn put_bytes(
        path: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let mut call = Self::new(Method::PUT, path);
        call.body = Some(RequestBody::Raw {
            content_type: content_type.into(),
            bytes,
        });
        call
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn sends_body(&self) -> bool {
        self.method != Method::GET && self.method != Method::DELETE
    }
}

/// Decoded response of [`Dispatcher::call`].
#[derive(Clone, Debug, PartialEq)]
pub enum GraphResponse {
    /// Items of a `{"value": [...]}` envelope (GET only)
    List(Vec<Value>),
    /// Decoded body as returned
    Json(Value),
    /// `204 No Content` or an empty body
    Empty,
}

impl GraphResponse {
    /// Items as a list. A single object becomes a one-element list.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            GraphResponse::List(items) => items,
            GraphResponse::Json(Value::Array(items)) => items,
            GraphResponse::Json(value) => vec![value],
            GraphResponse::Empty => Vec::new(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            GraphResponse::List(items) => Value::Array(items),
            GraphResponse::Json(value) => value,
            GraphResponse::Empty => Value::Null,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, GraphResponse::Empty)
    }
}

/// Typed response of [`Dispatcher::call_as`].
///
/// `Many` when the body is a `{"value": [...]}` envelope, `One` otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum Shaped<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Shaped<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Shaped::One(item) => vec![item],
            Shaped::Many(items) => items,
        }
    }

    /// The single object, or the first item of a list.
    pub fn into_one(self) -> Option<T> {
        match self {
            Shaped::One(item) => Some(item),
            Shaped::Many(items) => items.into_iter().next(),
        }
    }
}

/// Performs calls for one session.
///
/// The HTTP client belongs to this instance; tokens are fetched from the
/// [`TokenManager`] on every call and never cached here.
pub struct Dispatcher {
    tokens: Arc<TokenManager>,
    session: String,
    http: reqwest::Client,
    base_url: String,
}

impl Dispatcher {
    pub fn new(tokens: Arc<TokenManager>, session: impl Into<String>) -> Self {
        let base_url = tokens.endpoints().graph_base_url.clone();
        Self {
            tokens,
            session: session.into(),
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Overrides the REST base (e.g. the `beta` endpoint).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Sends `call` and returns the status and body of a 2xx response.
    async fn send(&self, call: &CallDescriptor) -> Result<(u16, Vec<u8>), GraphError> {
        let access_token = self.tokens.get_valid_access_token(&self.session).await?;
        let url = self.url_for(&call.path);

        debug!(
            session = %self.session,
            method = %call.method,
            path = %call.path,
            "Dispatching Graph call"
        );

        let mut request = self
            .http
            .request(call.method.clone(), &url)
            .bearer_auth(&access_token)
            .header("Accept", "application/json");

        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if call.sends_body() {
            request = match &call.body {
                Some(RequestBody::Json(body)) => request.json(body),
                Some(RequestBody::Raw {
                    content_type,
                    bytes,
                }) => request
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(bytes.clone()),
                None => request,
            };
        }

        let response = request.send().await.map_err(|e| {
            warn!(session = %self.session, path = %call.path, error = %e, "Graph call transport failure");
            GraphError::RemoteCall {
                status: None,
                body: e.to_string(),
            }
        })?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if !status.is_success() {
            warn!(
                session = %self.session,
                method = %call.method,
                path = %call.path,
                status = status.as_u16(),
                "Graph call failed"
            );
            return Err(GraphError::RemoteCall {
                status: Some(status.as_u16()),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok((status.as_u16(), body))
    }

    /// Performs `call` and decodes the body.
    ///
    /// GET responses shaped `{"value": [...]}` are unwrapped to
    /// [`GraphResponse::List`]; everything else is returned as decoded.
    pub async fn call(&self, call: CallDescriptor) -> Result<GraphResponse, GraphError> {
        let (status, body) = self.send(&call).await?;
        if status == 204 || body.iter().all(u8::is_ascii_whitespace) {
            return Ok(GraphResponse::Empty);
        }

        let value = decode_json(status, &body)?;
        if call.method == Method::GET {
            if let Value::Object(mut envelope) = value {
                return Ok(match envelope.remove("value") {
                    Some(Value::Array(items)) => GraphResponse::List(items),
                    Some(other) => {
                        envelope.insert("value".to_string(), other);
                        GraphResponse::Json(Value::Object(envelope))
                    }
                    None => GraphResponse::Json(Value::Object(envelope)),
                });
            }
        }
        Ok(GraphResponse::Json(value))
    }

    /// Performs `call` and deserializes the body into `T`, or into a list of
    /// `T` when the body is a `{"value": [...]}` envelope.
    pub async fn call_as<T: DeserializeOwned>(&self, call: CallDescriptor) -> Result<Shaped<T>, GraphError> {
        let (status, body) = self.send(&call).await?;
        let value = decode_json(status, &body)?;

        let shaped = match value {
            Value::Object(mut envelope) if matches!(envelope.get("value"), Some(Value::Array(_))) => {
                let items = envelope.remove("value").unwrap_or(Value::Null);
                Shaped::Many(decode_shape(status, items)?)
            }
            value => Shaped::One(decode_shape(status, value)?),
        };
        Ok(shaped)
    }

    /// Performs `call` and returns the body undecoded (file downloads).
    pub async fn call_raw(&self, call: CallDescriptor) -> Result<Vec<u8>, GraphError> {
        self.send(&call).await.map(|(_, body)| body)
    }

    pub async fn get(&self, path: &str) -> Result<GraphResponse, GraphError> {
        self.call(CallDescriptor::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<GraphResponse, GraphError> {
        self.call(CallDescriptor::post(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<GraphResponse, GraphError> {
        self.call(CallDescriptor::patch(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<GraphResponse, GraphError> {
        self.call(CallDescriptor::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<GraphResponse, GraphError> {
        self.call(CallDescriptor::delete(path)).await
    }
}

fn decode_json(status: u16, body: &[u8]) -> Result<Value, GraphError> {
    serde_json::from_slice(body).map_err(|e| GraphError::UnexpectedResponse {
        status,
        message: format!("Body is not JSON: {}", e),
    })
}

fn decode_shape<T: DeserializeOwned>(status: u16, value: Value) -> Result<T, GraphError> {
    serde_json::from_value(value).map_err(|e| GraphError::UnexpectedResponse {
        status,
        message: format!("Body does not match requested shape: {}", e),
    })
}
