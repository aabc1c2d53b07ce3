use serde::Deserialize;
use serde::Serialize;
use teloxide::types::MessageId;

use crate::models::ProductRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "data")]
pub enum ConversationState {
  #[default]
  Idle,
  AddProduct(ProductDraft),
  AddCategory {
    admin_tg_id: i64,
  },
  RenameCategory(RenameCategoryDraft),
  SetBanner {
    admin_tg_id: i64,
  },
  Checkout(CheckoutDraft),
}

/// Admin product creation/editing flow. When `editing` holds the original
/// row, a `.` reply at any step keeps the previous value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductDraft {
  pub stage: ProductStage,
  pub admin_tg_id: i64,
  pub editing: Option<ProductRow>,
  pub name: Option<String>,
  pub description: Option<String>,
  pub category_id: Option<i64>,
  pub price: Option<i64>,
}

impl ProductDraft {
  pub fn new(admin_tg_id: i64, editing: Option<ProductRow>) -> Self {
    Self {
      stage: ProductStage::Name,
      admin_tg_id,
      editing,
      name: None,
      description: None,
      category_id: None,
      price: None,
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProductStage {
  Name,
  Description,
  Category,
  Price,
  Image,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameCategoryDraft {
  pub admin_tg_id: i64,
  pub category_id: i64,
  pub old_name: String,
}

/// Linear checkout flow. All prompts edit the `anchor` message; user
/// replies are deleted after processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutDraft {
  pub stage: CheckoutStage,
  pub user_id: i64,
  pub anchor_chat_id: i64,
  pub anchor_message_id: MessageId,
  pub full_name: Option<String>,
  pub postal_code: Option<String>,
  pub phone: Option<String>,
  pub address: Option<String>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
  /// "Share contact" prompt message, deleted once the phone is captured.
  pub contact_prompt_message_id: Option<MessageId>,
}

impl CheckoutDraft {
  pub fn new(user_id: i64, anchor_chat_id: i64, anchor_message_id: MessageId) -> Self {
    Self {
      stage: CheckoutStage::Review,
      user_id,
      anchor_chat_id,
      anchor_message_id,
      full_name: None,
      postal_code: None,
      phone: None,
      address: None,
      lat: None,
      lon: None,
      contact_prompt_message_id: None,
    }
  }

  /// Going back to an earlier step drops everything collected after it.
  pub fn rewind_to(&mut self, stage: CheckoutStage) {
    self.stage = stage;
    match stage {
      CheckoutStage::Review => {
        self.full_name = None;
        self.postal_code = None;
        self.phone = None;
      },
      CheckoutStage::FullName => {
        self.postal_code = None;
        self.phone = None;
      },
      CheckoutStage::PostalCode => {
        self.phone = None;
      },
      CheckoutStage::Phone | CheckoutStage::Confirm => {},
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CheckoutStage {
  Review,
  FullName,
  PostalCode,
  Phone,
  Confirm,
}

#[cfg(test)]
mod tests {
  use teloxide::types::MessageId;

  use super::CheckoutDraft;
  use super::CheckoutStage;
  use super::ProductDraft;
  use super::ProductStage;

  #[test]
  fn new_product_draft_starts_with_name_stage() {
    let draft = ProductDraft::new(7, None);
    assert_eq!(draft.stage, ProductStage::Name);
    assert_eq!(draft.admin_tg_id, 7);
    assert!(draft.editing.is_none());
  }

  #[test]
  fn checkout_starts_at_review() {
    let draft = CheckoutDraft::new(1, 10, MessageId(20));
    assert_eq!(draft.stage, CheckoutStage::Review);
    assert!(draft.full_name.is_none());
  }

  #[test]
  fn rewinding_clears_later_fields() {
    let mut draft = CheckoutDraft::new(1, 10, MessageId(20));
    draft.full_name = Some("Jane Doe".to_string());
    draft.postal_code = Some("12345".to_string());
    draft.phone = Some("+79161234567".to_string());

    draft.rewind_to(CheckoutStage::FullName);
    assert_eq!(draft.stage, CheckoutStage::FullName);
    assert!(draft.full_name.is_some());
    assert!(draft.postal_code.is_none());
    assert!(draft.phone.is_none());
  }
}
