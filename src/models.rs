use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BannerRow {
  pub id: i64,
  pub name: String,
  pub image: Option<String>,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CategoryRow {
  pub id: i64,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductRow {
  pub id: i64,
  pub name: String,
  pub description: String,
  pub details_url: Option<String>,
  pub price: i64, // cents
  pub image: String,
  pub category_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[allow(dead_code)]
pub struct UserRow {
  pub id: i64, // tg id
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub phone: Option<String>,
  pub is_admin: bool,
  pub created_at: DateTime<Utc>,
}

/// Cart line joined with the product it points at.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartLine {
  pub product_id: i64,
  pub quantity: i32,
  pub name: String,
  pub price: i64, // cents
  pub image: String,
}

impl CartLine {
  pub fn subtotal(&self) -> i64 {
    self.price * i64::from(self.quantity)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[allow(dead_code)]
pub struct OrderRow {
  pub id: i64,
  pub user_id: i64,
  pub full_name: String,
  pub postal_code: String,
  pub phone: String,
  pub address: Option<String>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
  pub total_amount: i64, // cents
  pub status: String,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::CartLine;

  #[test]
  fn subtotal_multiplies_price_by_quantity() {
    let line = CartLine {
      product_id: 1,
      quantity: 3,
      name: "Tea".to_string(),
      price: 450,
      image: "file".to_string(),
    };
    assert_eq!(line.subtotal(), 1350);
  }
}
