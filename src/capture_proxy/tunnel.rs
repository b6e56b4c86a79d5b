//! Pass-through for protocol upgrades (WebSocket and the like)
//!
//! Upgraded connections are relayed byte for byte and never recorded.

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use url::Url;

use super::tls::CertAuthority;

/// Forward an upgrade request to the origin and splice both sides together
///
/// Returns the origin's response head. When the origin switches protocols the
/// two upgraded connections are copied into each other in the background.
pub async fn pass_through(
    certs: &CertAuthority,
    mut req: Request<Incoming>,
    url: &Url,
) -> Result<Response<()>> {
    let host = url.host_str().ok_or_else(|| anyhow!("{url} has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("{url} has no port"))?;

    let client_upgrade = hyper::upgrade::on(&mut req);
    let (mut parts, _body) = req.into_parts();
    let origin_form = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    parts.uri = origin_form.parse().context("origin-form request target")?;
    let outbound = Request::from_parts(parts, Empty::<Bytes>::new());

    let mut response = if url.scheme() == "https" {
        exchange(certs.connect_origin(host, port).await?, outbound).await?
    } else {
        let tcp = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("cannot connect to {host}:{port}"))?;
        exchange(tcp, outbound).await?
    };

    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        let origin_upgrade = hyper::upgrade::on(&mut response);
        let target = url.to_string();
        tokio::spawn(async move {
            match tokio::try_join!(client_upgrade, origin_upgrade) {
                Ok((client, origin)) => {
                    let mut client = TokioIo::new(client);
                    let mut origin = TokioIo::new(origin);
                    match tokio::io::copy_bidirectional(&mut client, &mut origin).await {
                        Ok((up, down)) => {
                            tracing::trace!("tunnel {target} closed ({up} bytes up, {down} down)");
                        }
                        Err(e) => tracing::debug!("tunnel {target} ended: {e}"),
                    }
                }
                Err(e) => tracing::debug!("upgrade of {target} failed: {e}"),
            }
        });
    }

    let (parts, _body) = response.into_parts();
    Ok(Response::from_parts(parts, ()))
}

async fn exchange<I>(io: I, request: Request<Empty<Bytes>>) -> Result<Response<Incoming>>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .context("origin handshake")?;
    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            tracing::debug!("origin connection closed: {e}");
        }
    });
    sender
        .send_request(request)
        .await
        .context("origin request")
}
