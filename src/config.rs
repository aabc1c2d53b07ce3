use std::env;

use anyhow::Context;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub database_url: String,
  pub admins: Vec<i64>,
  /// Chat that receives a notification for every submitted order.
  pub orders_chat_id: Option<i64>,
  pub telegraph_token: Option<String>,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let admins_raw = env::var("ADMIN_IDS").unwrap_or_default();
    let admins = parse_admins(&admins_raw);
    let orders_chat_id = parse_chat_id(env::var("ORDERS_CHAT_ID").ok().as_deref());
    let telegraph_token = env::var("TELEGRAPH_TOKEN").ok().filter(|token| !token.is_empty());
    Ok(Self {
      bot_token,
      database_url,
      admins,
      orders_chat_id,
      telegraph_token,
    })
  }
}

fn parse_admins(raw: &str) -> Vec<i64> {
  raw
    .split(',')
    .filter_map(|id| {
      let trimmed = id.trim();
      if trimmed.is_empty() {
        return None;
      }
      match trimmed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => {
          tracing::warn!(value = trimmed, error = %err, "invalid ADMIN_IDS entry");
          None
        },
      }
    })
    .collect()
}

fn parse_chat_id(raw: Option<&str>) -> Option<i64> {
  let trimmed = raw?.trim();
  if trimmed.is_empty() {
    return None;
  }
  match trimmed.parse::<i64>() {
    Ok(value) => Some(value),
    Err(err) => {
      tracing::warn!(value = trimmed, error = %err, "invalid ORDERS_CHAT_ID value");
      None
    },
  }
}

#[cfg(test)]
mod tests {
  use super::parse_admins;
  use super::parse_chat_id;

  #[test]
  fn parses_valid_admins() {
    let admins = parse_admins("1, 2 ,3");
    assert_eq!(admins, vec![1, 2, 3]);
  }

  #[test]
  fn skips_invalid_entries() {
    let admins = parse_admins("42,abc,  7");
    assert_eq!(admins, vec![42, 7]);
  }

  #[test]
  fn empty_input_yields_empty_list() {
    let admins = parse_admins("");
    assert!(admins.is_empty());
  }

  #[test]
  fn parses_orders_chat_id() {
    assert_eq!(parse_chat_id(Some(" -100123 ")), Some(-100123));
    assert_eq!(parse_chat_id(Some("nope")), None);
    assert_eq!(parse_chat_id(Some("")), None);
    assert_eq!(parse_chat_id(None), None);
  }
}
