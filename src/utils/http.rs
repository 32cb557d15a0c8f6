use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Client;
use tracing::warn;

use crate::error::{PosterError, PosterResult};

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|err| {
            warn!("Falling back to default HTTP client: {err}");
            Client::new()
        })
});

/// Client for short auxiliary fetches such as Telegram file downloads.
pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}

pub async fn download_bytes(client: &Client, url: &str) -> PosterResult<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| PosterError::FileRead(format!("download failed: {}", err.without_url())))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PosterError::FileRead(format!(
            "download failed with status {status}"
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| PosterError::FileRead(format!("download interrupted: {}", err.without_url())))?;
    Ok(bytes.to_vec())
}
