//! HTTP image fetching for cache prefills.

use base64::prelude::{Engine, BASE64_STANDARD};
use color_eyre::{eyre::eyre, Result};

/// A fetched image body with its declared content type.
#[derive(Debug, Clone)]
pub struct FetchedImage {
  pub bytes: Vec<u8>,
  pub content_type: String,
}

impl FetchedImage {
  /// Encode as a `data:` URL, the cache's binary-as-text payload form.
  pub fn to_data_url(&self) -> String {
    format!(
      "data:{};base64,{}",
      self.content_type,
      BASE64_STANDARD.encode(&self.bytes)
    )
  }
}

/// HTTP client for downloading images.
#[derive(Clone, Default)]
pub struct ImageClient {
  http: reqwest::Client,
}

impl ImageClient {
  pub fn new() -> Self {
    Self::default()
  }

  /// Download an image, returning its bytes and content type.
  pub async fn fetch_image(&self, url: &str) -> Result<FetchedImage> {
    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch image {}: {}", url, e))?;

    let response = response
      .error_for_status()
      .map_err(|e| eyre!("Image fetch for {} returned an error: {}", url, e))?;

    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or("application/octet-stream")
      .to_string();

    let bytes = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read image body for {}: {}", url, e))?;

    Ok(FetchedImage {
      bytes: bytes.to_vec(),
      content_type,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_to_data_url() {
    let image = FetchedImage {
      bytes: vec![0x89, 0x50, 0x4e, 0x47],
      content_type: "image/png".to_string(),
    };
    assert_eq!(image.to_data_url(), "data:image/png;base64,iVBORw==");
  }
}
