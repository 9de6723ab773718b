//! Raw TCP transport for a first-generation network hub.

use tokio::net::TcpStream;

use crate::error::Result;

/// Connect to a hub exposing the PLM stream on `host:port`.
pub async fn connect(addr: &str) -> Result<TcpStream> {
    Ok(TcpStream::connect(addr).await?)
}
