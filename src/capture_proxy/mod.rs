//! Intercepting HTTP relay between the renderer and the network
//!
//! Requests for locations already in the resource table are answered from
//! the table. Everything else is forwarded to the origin; successful `GET`
//! responses for unseen locations are recorded while the renderer reads them
//! and stored once the body is complete. `CONNECT` tunnels are always
//! terminated here with a per-host certificate so that secure resources are
//! visible too.

pub mod group;
pub mod recorder;
pub mod tls;
pub mod tunnel;

pub use group::{CaptureGroup, CaptureGuard};
pub use recorder::RecordingStream;
pub use tls::CertAuthority;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashSet;
use futures::future::BoxFuture;
use futures::{StreamExt, TryStreamExt};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::ConvertConfig;
use crate::error::{Result, SinglefileError};
use crate::resource::{Aliases, Resource, ResourceTable};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

const NO_HOST_MESSAGE: &str = "Cannot handle requests without Host header, e.g., HTTP 1.0";

/// Headers that describe one hop, not the message
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

struct State {
    table: Weak<ResourceTable>,
    aliases: Aliases,
    client: reqwest::Client,
    captures: Arc<CaptureGroup>,
    pending: DashSet<String>,
    certs: CertAuthority,
    verbose: bool,
}

impl State {
    fn lookup(&self, url: &str) -> Option<Arc<Resource>> {
        let table = self.table.upgrade()?;
        table
            .get(url)
            .or_else(|| table.get(&self.aliases.absolute(url)))
    }

    fn is_known(&self, url: &str) -> bool {
        self.table.upgrade().is_some_and(|t| t.contains(url))
    }

    fn note(&self, message: std::fmt::Arguments<'_>) {
        if self.verbose {
            debug!("{message}");
        } else {
            trace!("{message}");
        }
    }
}

/// A running relay
///
/// Holds the resource table weakly: the session that owns the table decides
/// its lifetime, and captures that finish after it is gone are discarded.
pub struct CaptureProxy {
    addr: SocketAddr,
    state: Arc<State>,
    accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for CaptureProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureProxy")
            .field("addr", &self.addr)
            .field("outstanding", &self.outstanding_captures())
            .finish()
    }
}

impl CaptureProxy {
    /// Bind the relay and start accepting connections
    pub async fn start(
        table: &Arc<ResourceTable>,
        aliases: Aliases,
        config: &ConvertConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.dial_timeout())
            .no_proxy()
            .build()
            .map_err(|e| SinglefileError::Proxy(format!("cannot build origin client: {e}")))?;

        let listener = TcpListener::bind(config.proxy_bind())
            .await
            .map_err(|e| SinglefileError::Proxy(format!("cannot bind {}: {e}", config.proxy_bind())))?;
        let addr = listener.local_addr()?;

        let state = Arc::new(State {
            table: Arc::downgrade(table),
            aliases,
            client,
            captures: CaptureGroup::new(),
            pending: DashSet::new(),
            certs: CertAuthority::new(),
            verbose: config.verbose(),
        });

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        trace!("relay connection from {peer}");
                        tokio::spawn(serve_connection(Arc::clone(&accept_state), stream, None));
                    }
                    Err(e) => {
                        warn!("relay accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        });

        debug!("capture proxy listening on {addr}");
        Ok(Self {
            addr,
            state,
            accept_task,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address to hand to the renderer as its proxy server
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    #[must_use]
    pub fn outstanding_captures(&self) -> usize {
        self.state.captures.active()
    }

    /// Wait (bounded) for captures already started; returns how many are left
    pub async fn wait_for_captures(&self, timeout: Duration) -> usize {
        self.state.captures.wait_idle(timeout).await
    }

    /// Stop accepting connections, then join outstanding captures
    pub async fn shutdown(self, timeout: Duration) -> usize {
        self.accept_task.abort();
        let left = self.wait_for_captures(timeout).await;
        if left > 0 {
            warn!("{left} captures still running after {timeout:?}, continuing without them");
        }
        left
    }
}

impl Drop for CaptureProxy {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Serve one client connection; `secure_authority` is set inside an intercepted tunnel
fn serve_connection<I>(
    state: Arc<State>,
    io: I,
    secure_authority: Option<String>,
) -> BoxFuture<'static, ()>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    Box::pin(async move {
        let service = service_fn(move |req| {
            let state = Arc::clone(&state);
            let authority = secure_authority.clone();
            async move { Ok::<_, Infallible>(handle(state, req, authority).await) }
        });

        if let Err(e) = http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(true)
            .serve_connection(TokioIo::new(io), service)
            .with_upgrades()
            .await
        {
            trace!("relay connection closed: {e}");
        }
    })
}

async fn handle(
    state: Arc<State>,
    req: Request<Incoming>,
    secure_authority: Option<String>,
) -> Response<ProxyBody> {
    if req.method() == Method::CONNECT {
        return intercept(state, req);
    }

    let Some(url) = request_url(&req, secure_authority.as_deref()) else {
        return text_response(StatusCode::BAD_REQUEST, NO_HOST_MESSAGE);
    };

    if let Some(resource) = state.lookup(url.as_str()) {
        state.note(format_args!("read local: {url}"));
        return cached_response(&resource);
    }
    state.note(format_args!("read remote: {url}"));

    if is_upgrade(&req) {
        return match tunnel::pass_through(&state.certs, req, &url).await {
            Ok(head) => head.map(|()| empty_body()),
            Err(e) => {
                warn!("cannot relay upgrade for {url}: {e:#}");
                text_response(StatusCode::BAD_GATEWAY, &e.to_string())
            }
        };
    }

    forward(state, req, url).await
}

/// Terminate a `CONNECT` tunnel and serve the requests inside it
fn intercept(state: Arc<State>, req: Request<Incoming>) -> Response<ProxyBody> {
    let Some(authority) = req.uri().authority().map(ToString::to_string) else {
        return text_response(StatusCode::BAD_REQUEST, "CONNECT without authority");
    };
    let host = req.uri().host().unwrap_or_default().to_string();

    let acceptor = match state.certs.acceptor(&host) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            warn!("cannot intercept {authority}: {e:#}");
            return text_response(StatusCode::BAD_GATEWAY, &e.to_string());
        }
    };

    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(req).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                debug!("CONNECT {authority} upgrade failed: {e}");
                return;
            }
        };
        match acceptor.accept(TokioIo::new(upgraded)).await {
            Ok(tls) => serve_connection(state, tls, Some(authority)).await,
            Err(e) => debug!("TLS accept for {authority} failed: {e}"),
        }
    });

    Response::new(empty_body())
}

/// Absolute URL of a relayed request
///
/// The `Host` header names the origin, falling back to the request target's
/// authority and then to the tunnel's. Requests that arrive in origin form
/// without a tunnel are plain `http`.
fn request_url(req: &Request<Incoming>, secure_authority: Option<&str>) -> Option<Url> {
    let scheme = match secure_authority {
        Some(_) => "https",
        None => req.uri().scheme_str().unwrap_or("http"),
    };
    let authority = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(ToString::to_string))
        .or_else(|| secure_authority.map(str::to_string))?;
    let target = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());

    Url::parse(&format!("{scheme}://{authority}{target}")).ok()
}

fn is_upgrade(req: &Request<Incoming>) -> bool {
    req.headers().contains_key(header::UPGRADE)
        && req
            .headers()
            .get(header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

async fn forward(state: Arc<State>, req: Request<Incoming>, url: Url) -> Response<ProxyBody> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("request body for {url} failed: {e}");
            return text_response(StatusCode::BAD_REQUEST, "unreadable request body");
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

    let origin = match state
        .client
        .request(parts.method.clone(), url.as_str())
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(origin) => origin,
        Err(e) => {
            warn!("cannot reach {url}: {e}");
            return text_response(StatusCode::BAD_GATEWAY, &e.to_string());
        }
    };

    let status = origin.status();
    let mut response_headers = origin.headers().clone();
    strip_hop_by_hop(&mut response_headers);
    let content_type = header_text(&response_headers, header::CONTENT_TYPE);
    let content_encoding = header_text(&response_headers, header::CONTENT_ENCODING);
    let expected_len = origin.content_length();

    let stream = origin
        .bytes_stream()
        .map_err(|e| Box::new(e) as BoxError)
        .boxed();

    let key = url.to_string();
    let capture = parts.method == Method::GET
        && status.is_success()
        && !state.is_known(&key)
        && state.pending.insert(key.clone());

    let body = if capture {
        let (recording, complete) = RecordingStream::new(stream, expected_len);
        let guard = state.captures.start();
        let capture_state = Arc::clone(&state);
        tokio::spawn(async move {
            let _guard = guard;
            match complete.await {
                Ok(data) => store_capture(&capture_state, &key, content_type, content_encoding, data),
                Err(_) => trace!("capture of {key} abandoned"),
            }
            capture_state.pending.remove(&key);
        });
        stream_body(recording.boxed())
    } else {
        stream_body(stream)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

fn store_capture(
    state: &State,
    url: &str,
    content_type: Option<String>,
    content_encoding: Option<String>,
    data: Bytes,
) {
    let Some(table) = state.table.upgrade() else {
        return;
    };
    if table.contains(url) {
        return;
    }
    state.note(format_args!("caching: {url}"));
    let resource = Resource::new(content_type.as_deref().unwrap_or_default(), url, data)
        .with_content_encoding(content_encoding);
    table.insert([url], resource);
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn cached_response(resource: &Resource) -> Response<ProxyBody> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, resource.data().len());
    if !resource.mime_type().is_empty() {
        let content_type = match resource.text_encoding() {
            Some(charset) if resource.mime_type().starts_with("text/") => {
                format!("{}; charset={charset}", resource.mime_type())
            }
            _ => resource.mime_type().to_string(),
        };
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(encoding) = resource.content_encoding() {
        builder = builder.header(header::CONTENT_ENCODING, encoding);
    }

    builder
        .body(full_body(resource.data().clone()))
        .unwrap_or_else(|e| text_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
}

fn text_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn full_body(data: Bytes) -> ProxyBody {
    Full::new(data).map_err(|never| match never {}).boxed_unsync()
}

fn empty_body() -> ProxyBody {
    full_body(Bytes::new())
}

fn stream_body(stream: futures::stream::BoxStream<'static, std::result::Result<Bytes, BoxError>>) -> ProxyBody {
    StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
}
