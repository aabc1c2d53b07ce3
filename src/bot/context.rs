use std::collections::HashSet;

use anyhow::Result;

use crate::db::Db;

#[derive(Clone)]
pub struct AppContext {
  db: Db,
  admins: HashSet<i64>,
  orders_chat_id: Option<i64>,
  telegraph_token: Option<String>,
}

impl AppContext {
  pub fn new(db: Db, admins: Vec<i64>, orders_chat_id: Option<i64>, telegraph_token: Option<String>) -> Self {
    Self {
      db,
      admins: admins.into_iter().collect(),
      orders_chat_id,
      telegraph_token,
    }
  }

  pub fn db(&self) -> &Db {
    &self.db
  }

  pub fn orders_chat_id(&self) -> Option<i64> {
    self.orders_chat_id
  }

  pub fn telegraph_token(&self) -> Option<&str> {
    self.telegraph_token.as_deref()
  }

  /// Admins come from the static ADMIN_IDS list or from the db flag that
  /// /add_admin maintains.
  pub async fn is_admin(&self, tg_id: i64) -> Result<bool> {
    if self.admins.contains(&tg_id) {
      return Ok(true);
    }
    self.db.is_admin_user(tg_id).await
  }
}
