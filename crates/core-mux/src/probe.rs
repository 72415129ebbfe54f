//! Local server discovery.
//!
//! One plain HTTP GET against the configured port returns the server's
//! metadata: protocol version and the WebSocket port to dial. The request
//! is blocking (`ureq`) and runs on the blocking pool. A failure is always
//! fatal for the connection attempt; there is no retry.

use crate::MuxError;
use core_protocol::ServerInfo;

fn fetch_blocking(url: &str) -> Result<ServerInfo, MuxError> {
    let response = ureq::get(url).call().map_err(|err| MuxError::Probe {
        url: url.to_string(),
        reason: err.to_string(),
    })?;
    response
        .into_json::<ServerInfo>()
        .map_err(|err| MuxError::Probe {
            url: url.to_string(),
            reason: format!("malformed metadata body: {err}"),
        })
}

pub async fn fetch(url: String) -> Result<ServerInfo, MuxError> {
    let display_url = url.clone();
    tokio::task::spawn_blocking(move || fetch_blocking(&url))
        .await
        .map_err(|err| MuxError::Probe {
            url: display_url,
            reason: format!("probe task failed: {err}"),
        })?
}
