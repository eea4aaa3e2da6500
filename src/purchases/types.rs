use serde::{Deserialize, Serialize};

/// How the user pays for a purchase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
  #[default]
  Card,
  Wallet,
  Sbp,
}

/// A user-initiated purchase, as carried by the submission event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
  pub game_id: i64,
  pub game_name: String,
  pub price: f64,
  pub user_id: i64,
  pub payment_method: PaymentMethod,
}

/// A purchase accepted locally but not yet confirmed by the remote peer.
///
/// The `id` is unique, assigned at creation and never reused; the entry
/// persists across page reloads until delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPurchase {
  pub id: String,
  pub game_id: i64,
  pub game_name: String,
  pub price: f64,
  pub user_id: i64,
  pub payment_method: PaymentMethod,
  /// Creation time, Unix milliseconds.
  pub created_at: i64,
}

impl PendingPurchase {
  /// The submission-shaped view of this entry, used for replay.
  pub fn request(&self) -> PurchaseRequest {
    PurchaseRequest {
      game_id: self.game_id,
      game_name: self.game_name.clone(),
      price: self.price,
      user_id: self.user_id,
      payment_method: self.payment_method,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_payment_method_wire_form() {
    assert_eq!(
      serde_json::to_string(&PaymentMethod::Card).unwrap(),
      "\"card\""
    );
    assert_eq!(
      serde_json::from_str::<PaymentMethod>("\"wallet\"").unwrap(),
      PaymentMethod::Wallet
    );
  }
}
