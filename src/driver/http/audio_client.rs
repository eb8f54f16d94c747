//! network microphone / speaker http client

use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::common::error::DriverError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn probe(client: &Client, host: &str, port: u16) -> bool {
    match client
        .get(format!("http://{}:{}/api/status", host, port))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

pub async fn set_volume(client: &Client, host: &str, port: u16, volume: i64) -> Result<(), DriverError> {
    let resp = client
        .post(format!("http://{}:{}/api/volume", host, port))
        .timeout(REQUEST_TIMEOUT)
        .json(&json!({ "volume": volume }))
        .send()
        .await
        .map_err(|e| DriverError(format!("audio client: volume request to {} failed, msg: {}", host, e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!("audio client: {} rejected volume, status: {}", host, resp.status())));
    }
    Ok(())
}

pub async fn set_muted(client: &Client, host: &str, port: u16, muted: bool) -> Result<(), DriverError> {
    let resp = client
        .post(format!("http://{}:{}/api/mute", host, port))
        .timeout(REQUEST_TIMEOUT)
        .json(&json!({ "mute": muted }))
        .send()
        .await
        .map_err(|e| DriverError(format!("audio client: mute request to {} failed, msg: {}", host, e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!("audio client: {} rejected mute, status: {}", host, resp.status())));
    }
    Ok(())
}
