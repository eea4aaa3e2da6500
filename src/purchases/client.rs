//! HTTP implementation of the remote purchase endpoint.

use color_eyre::{eyre::eyre, Result};

use super::dispatch::PurchaseEndpoint;
use super::types::PurchaseRequest;

/// Submits purchases to the store backend over HTTP.
///
/// The wire body is the backend's snake_case form:
/// `{ game_id, user_id, payment_method, amount }`.
#[derive(Clone)]
pub struct HttpPurchaseEndpoint {
  http: reqwest::Client,
  url: String,
}

impl HttpPurchaseEndpoint {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      http: reqwest::Client::new(),
      url: url.into(),
    }
  }
}

impl PurchaseEndpoint for HttpPurchaseEndpoint {
  async fn submit(&self, request: &PurchaseRequest) -> Result<u16> {
    let body = serde_json::json!({
      "game_id": request.game_id,
      "user_id": request.user_id,
      "payment_method": request.payment_method,
      "amount": request.price,
    });

    let response = self
      .http
      .post(&self.url)
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to submit purchase: {}", e))?;

    Ok(response.status().as_u16())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::purchases::types::PaymentMethod;

  #[test]
  fn test_wire_body_shape() {
    let request = PurchaseRequest {
      game_id: 42,
      game_name: "Cyber Raid".to_string(),
      price: 59.99,
      user_id: 1,
      payment_method: PaymentMethod::Card,
    };

    let body = serde_json::json!({
      "game_id": request.game_id,
      "user_id": request.user_id,
      "payment_method": request.payment_method,
      "amount": request.price,
    });

    assert_eq!(
      body,
      serde_json::json!({
        "game_id": 42,
        "user_id": 1,
        "payment_method": "card",
        "amount": 59.99,
      })
    );
  }
}
