use std::time::Duration;

use bytes::Bytes;
use getset::Getters;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{models::ApiVersion, DockerError, DockerResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A request against the engine's REST API.
///
/// The path is given without the `/v1.xx` prefix; the transport adds it.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EngineRequest {
    /// The HTTP method.
    method: Method,

    /// The unversioned path, e.g. `/containers/json`.
    path: String,

    /// Query parameters, encoded in order.
    query: Vec<(String, String)>,

    /// The json body, if any.
    body: Option<Bytes>,

    /// Overrides the transport's default timeout.
    timeout: Option<Duration>,
}

/// A fully buffered response from the engine.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct EngineResponse {
    /// The status code.
    status: StatusCode,

    /// The response headers.
    headers: HeaderMap,

    /// The response body, with any chunked encoding removed.
    body: Bytes,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EngineRequest {
    /// Creates a request with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Creates a `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the body to the json encoding of `value`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> DockerResult<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(value)?));
        Ok(self)
    }

    /// Sets the timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the request target sent on the wire: the versioned path plus the percent-encoded
    /// query.
    pub fn target(&self, api_version: ApiVersion) -> DockerResult<String> {
        let mut url = Url::parse("http://localhost/")
            .and_then(|base| base.join(&format!("v{api_version}{}", self.path)))
            .map_err(|e| DockerError::InvalidArgument(format!("invalid path {}: {e}", self.path)))?;

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        Ok(match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        })
    }
}

impl EngineResponse {
    /// Creates a response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns true for 2xx responses and `304 Not Modified`.
    ///
    /// The engine answers 304 when a container is already in the requested state.
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// Turns a non-success response into a [`DockerError::Engine`].
    pub fn error_for_status(self) -> DockerResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(engine_error(self.status, &self.body))
        }
    }

    /// Decodes the body as json.
    pub fn json<T: DeserializeOwned>(&self) -> DockerResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Returns the body as lossy utf-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

pub(crate) fn is_success_status(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_MODIFIED
}

/// Builds the engine error for a failed response, pulling the message out of the engine's
/// `{"message": ...}` body when there is one.
pub(crate) fn engine_error(status: StatusCode, body: &[u8]) -> DockerError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(error) => Some(error.message),
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
    };

    DockerError::Engine {
        status: status.as_u16(),
        message,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
