//! led wall controller http client
//! every call is bounded by the request timeout, a hung controller can never
//! stall a monitor tick past it

use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::common::error::DriverError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// probe one controller ip, any 2xx answer counts as responding
pub async fn probe(client: &Client, ip: &str, port: u16) -> bool {
    match client
        .get(format!("http://{}:{}/api/status", ip, port))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// push brightness as the device side 0.0..1.0 scalar
pub async fn set_brightness(client: &Client, ip: &str, port: u16, scalar: f64) -> Result<(), DriverError> {
    let resp = client
        .post(format!("http://{}:{}/api/brightness", ip, port))
        .timeout(REQUEST_TIMEOUT)
        .json(&json!({ "brightness": scalar }))
        .send()
        .await
        .map_err(|e| DriverError(format!("display client: brightness request to {} failed, msg: {}", ip, e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!(
            "display client: {} rejected brightness, status: {}",
            ip,
            resp.status()
        )));
    }
    Ok(())
}

pub async fn set_power(client: &Client, ip: &str, port: u16, on: bool) -> Result<(), DriverError> {
    let resp = client
        .post(format!("http://{}:{}/api/power", ip, port))
        .timeout(REQUEST_TIMEOUT)
        .json(&json!({ "on": on }))
        .send()
        .await
        .map_err(|e| DriverError(format!("display client: power request to {} failed, msg: {}", ip, e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!(
            "display client: {} rejected power command, status: {}",
            ip,
            resp.status()
        )));
    }
    Ok(())
}
