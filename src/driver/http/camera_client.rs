//! camera controller companion service client
//! the service speaks normalized units, -1.0..1.0 for pan/tilt and 0.0..1.0
//! for zoom, conversion from the external ranges happens in the module

use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::common::error::DriverError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn get_status(client: &Client, host: &str, port: u16) -> Result<Value, DriverError> {
    let resp = client
        .get(format!("http://{}:{}/api/v1/camera/status", host, port))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| DriverError(format!("camera client: status request to {} failed, msg: {}", host, e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!("camera client: {} status error: {}", host, resp.status())));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| DriverError(format!("camera client: malformed status payload, msg: {}", e)))
}

pub async fn set_position(
    client: &Client,
    host: &str,
    port: u16,
    pan: f64,
    tilt: f64,
    zoom: f64,
) -> Result<(), DriverError> {
    let resp = client
        .post(format!("http://{}:{}/api/v1/camera/position", host, port))
        .timeout(REQUEST_TIMEOUT)
        .json(&json!({ "pan": pan, "tilt": tilt, "zoom": zoom }))
        .send()
        .await
        .map_err(|e| DriverError(format!("camera client: position request to {} failed, msg: {}", host, e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!("camera client: {} rejected position, status: {}", host, resp.status())));
    }
    Ok(())
}
