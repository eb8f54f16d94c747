//! chrome devtools http endpoints
//! only the http surface is used here, tab navigation and version info,
//! deeper cdp control stays outside the engine

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::common::error::DriverError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn get_version(client: &Client, host: &str, port: u16) -> Result<Value, DriverError> {
    let resp = client
        .get(format!("http://{}:{}/json/version", host, port))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| DriverError(format!("chromium client: version request failed, msg: {}", e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!("chromium client: version error: {}", resp.status())));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| DriverError(format!("chromium client: malformed version payload, msg: {}", e)))
}

pub async fn list_tabs(client: &Client, host: &str, port: u16) -> Result<Vec<Value>, DriverError> {
    let resp = client
        .get(format!("http://{}:{}/json/list", host, port))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| DriverError(format!("chromium client: tab list request failed, msg: {}", e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!("chromium client: tab list error: {}", resp.status())));
    }
    resp.json::<Vec<Value>>()
        .await
        .map_err(|e| DriverError(format!("chromium client: malformed tab list, msg: {}", e)))
}

/// open a tab on the given url
/// newer chromium only accepts PUT on /json/new
pub async fn open_tab(client: &Client, host: &str, port: u16, url: &str) -> Result<(), DriverError> {
    let resp = client
        .put(format!("http://{}:{}/json/new?{}", host, port, url))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| DriverError(format!("chromium client: open tab failed, msg: {}", e)))?;
    if !resp.status().is_success() {
        return Err(DriverError(format!("chromium client: open tab error: {}", resp.status())));
    }
    Ok(())
}
