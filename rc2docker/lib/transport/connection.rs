use std::{io, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use getset::Getters;
use http::{header, Request};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, client::conn::http1::SendRequest, Response};
use hyper_util::rt::TokioIo;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, UnixStream},
    task::JoinHandle,
};
use typed_builder::TypedBuilder;

use crate::{
    config::{DEFAULT_REQUEST_TIMEOUT, REQUIRED_API_VERSION},
    models::ApiVersion,
    DockerError, DockerResult, TransportError,
};

use super::{engine_error, is_success_status, EngineRequest, EngineResponse, Endpoint};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A lazy, non-restartable sequence of body chunks.
pub type ByteStream = BoxStream<'static, DockerResult<Bytes>>;

/// Sends requests to the engine.
///
/// Implementations never retry. A connect failure or timeout is returned immediately and a
/// non-success status is returned as [`DockerError::Engine`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and reads the whole response before returning.
    async fn send(&self, request: EngineRequest) -> DockerResult<EngineResponse>;

    /// Sends the request and returns once the response headers arrive. The body is delivered
    /// chunk by chunk as the engine writes it. Dropping the stream closes the connection.
    async fn stream(&self, request: EngineRequest) -> DockerResult<ByteStream>;
}

/// A [`Transport`] that opens one HTTP/1.1 connection per request.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct SocketTransport {
    /// Where the engine listens.
    #[builder(default)]
    endpoint: Endpoint,

    /// The API version prefixed to every path.
    #[builder(default = REQUIRED_API_VERSION)]
    api_version: ApiVersion,

    /// Timeout for buffered requests, and for the headers of streamed ones.
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    timeout: Duration,
}

/// Aborts the spawned connection driver when the owner goes away, releasing the socket.
struct ConnectionGuard(JoinHandle<()>);

type Sender = SendRequest<Full<Bytes>>;

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SocketTransport {
    /// Creates a transport for `endpoint` with the default API version and timeout.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::builder().endpoint(endpoint).build()
    }

    async fn connect(&self) -> DockerResult<(Sender, ConnectionGuard)> {
        match &self.endpoint {
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| self.connect_error(e))?;
                handshake(stream).await
            }
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|e| self.connect_error(e))?;
                handshake(stream).await
            }
        }
    }

    fn connect_error(&self, error: io::Error) -> DockerError {
        match error.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                TransportError::EngineUnavailable {
                    endpoint: self.endpoint.to_string(),
                    source: error,
                }
                .into()
            }
            _ => TransportError::Io(error).into(),
        }
    }

    fn build_request(
        &self,
        request: &EngineRequest,
        close: bool,
    ) -> DockerResult<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(request.get_method().clone())
            .uri(request.target(self.api_version)?)
            .header(header::HOST, "localhost");

        if close {
            builder = builder.header(header::CONNECTION, "close");
        }

        let body = match request.get_body() {
            Some(body) => {
                builder = builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, body.len());
                body.clone()
            }
            None => Bytes::new(),
        };

        builder
            .body(Full::new(body))
            .map_err(|e| DockerError::InvalidArgument(format!("invalid request: {e}")))
    }

    async fn exchange(
        &self,
        request: &EngineRequest,
        close: bool,
    ) -> DockerResult<(Response<Incoming>, Sender, ConnectionGuard)> {
        let (mut sender, guard) = self.connect().await?;
        let http_request = self.build_request(request, close)?;

        tracing::trace!("{} {}", request.get_method(), http_request.uri());

        let response = sender
            .send_request(http_request)
            .await
            .map_err(TransportError::from)?;

        Ok((response, sender, guard))
    }

    fn timeout_for(&self, request: &EngineRequest) -> Duration {
        request.get_timeout().unwrap_or(self.timeout)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl Transport for SocketTransport {
    async fn send(&self, request: EngineRequest) -> DockerResult<EngineResponse> {
        let timeout = self.timeout_for(&request);
        let exchange = async {
            let (response, _sender, _guard) = self.exchange(&request, true).await?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(TransportError::from)?
                .to_bytes();
            Ok::<_, DockerError>(EngineResponse::new(parts.status, parts.headers, body))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn stream(&self, request: EngineRequest) -> DockerResult<ByteStream> {
        let timeout = self.timeout_for(&request);
        let (response, sender, guard) =
            tokio::time::timeout(timeout, self.exchange(&request, false))
                .await
                .map_err(|_| TransportError::Timeout(timeout))??;

        let status = response.status();
        let mut body = response.into_body();

        if !is_success_status(status) {
            let bytes = tokio::time::timeout(timeout, body.collect())
                .await
                .map_err(|_| TransportError::Timeout(timeout))?
                .map_err(TransportError::from)?
                .to_bytes();
            return Err(engine_error(status, &bytes));
        }

        let stream = async_stream::try_stream! {
            let _sender = sender;
            let _guard = guard;
            while let Some(frame) = body.frame().await {
                let frame = frame.map_err(|e| DockerError::from(TransportError::from(e)))?;
                if let Ok(data) = frame.into_data() {
                    if !data.is_empty() {
                        yield data;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn handshake<T>(stream: T) -> DockerResult<(Sender, ConnectionGuard)>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(TransportError::from)?;

    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("engine connection closed: {e}");
        }
    });

    Ok((sender, ConnectionGuard(driver)))
}
