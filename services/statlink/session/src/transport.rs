//! TCP transport for statlink sessions.

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connect to `host:port`, optionally bounded by `timeout`
pub async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let stream = bounded(timeout, TcpStream::connect((host, port))).await?;

    // Requests are tiny and latency-bound
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Await a connection attempt, failing with `TimedOut` once `timeout` passes
pub(crate) async fn bounded<F, T>(timeout: Option<Duration>, connect: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
        None => connect.await,
    }
}
