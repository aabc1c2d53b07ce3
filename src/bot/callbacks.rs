//! Typed callback data for the customer menu.
//!
//! Everything the storefront menu can do is encoded as compact
//! `prefix:field:field` strings so a single callback handler can route it.
//! Admin panel callbacks stay as plain prefixed strings in the handler.

use std::fmt;

/// Mutating cart buttons shown on a cart page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartAction {
  Add,
  Increment,
  Decrement,
  Delete,
}

impl CartAction {
  fn as_str(self) -> &'static str {
    match self {
      Self::Add => "add",
      Self::Increment => "inc",
      Self::Decrement => "dec",
      Self::Delete => "del",
    }
  }

  fn parse(value: &str) -> Option<Self> {
    match value {
      "add" => Some(Self::Add),
      "inc" => Some(Self::Increment),
      "dec" => Some(Self::Decrement),
      "del" => Some(Self::Delete),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCallback {
  Main,
  Catalog,
  /// Informational banner page (about, payment, shipping).
  Info(String),
  /// Paginated product browser within a category.
  Products {
    category_id: i64,
    page: usize,
  },
  /// Paginated cart view.
  Cart {
    page: usize,
  },
  /// Cart mutation followed by a cart/product re-render.
  CartAction {
    action: CartAction,
    product_id: i64,
    page: usize,
  },
}

impl MenuCallback {
  pub fn parse(data: &str) -> Option<Self> {
    let (prefix, rest) = data.split_once(':')?;
    match prefix {
      "menu" => match rest {
        "main" => Some(Self::Main),
        "catalog" => Some(Self::Catalog),
        _ => {
          if let Some(page) = rest.strip_prefix("info:") {
            if page.is_empty() {
              None
            } else {
              Some(Self::Info(page.to_string()))
            }
          } else if let Some(fields) = rest.strip_prefix("products:") {
            let (category, page) = fields.split_once(':')?;
            Some(Self::Products {
              category_id: category.parse().ok()?,
              page: page.parse().ok()?,
            })
          } else {
            rest.strip_prefix("cart:").and_then(|page| {
              Some(Self::Cart {
                page: page.parse().ok()?,
              })
            })
          }
        },
      },
      "cart" => {
        let mut fields = rest.split(':');
        let action = CartAction::parse(fields.next()?)?;
        let product_id = fields.next()?.parse().ok()?;
        let page = fields.next()?.parse().ok()?;
        if fields.next().is_some() {
          return None;
        }
        Some(Self::CartAction {
          action,
          product_id,
          page,
        })
      },
      _ => None,
    }
  }
}

impl fmt::Display for MenuCallback {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Main => write!(f, "menu:main"),
      Self::Catalog => write!(f, "menu:catalog"),
      Self::Info(page) => write!(f, "menu:info:{page}"),
      Self::Products { category_id, page } => write!(f, "menu:products:{category_id}:{page}"),
      Self::Cart { page } => write!(f, "menu:cart:{page}"),
      Self::CartAction {
        action,
        product_id,
        page,
      } => write!(f, "cart:{}:{product_id}:{page}", action.as_str()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::CartAction;
  use super::MenuCallback;

  #[test]
  fn round_trips_every_variant() {
    let samples = [
      MenuCallback::Main,
      MenuCallback::Catalog,
      MenuCallback::Info("payment".to_string()),
      MenuCallback::Products {
        category_id: 3,
        page: 2,
      },
      MenuCallback::Cart { page: 1 },
      MenuCallback::CartAction {
        action: CartAction::Decrement,
        product_id: 17,
        page: 4,
      },
    ];

    for sample in samples {
      let encoded = sample.to_string();
      assert_eq!(MenuCallback::parse(&encoded), Some(sample), "{encoded}");
    }
  }

  #[test]
  fn rejects_malformed_data() {
    assert_eq!(MenuCallback::parse("menu"), None);
    assert_eq!(MenuCallback::parse("menu:products:x:1"), None);
    assert_eq!(MenuCallback::parse("cart:zap:1:1"), None);
    assert_eq!(MenuCallback::parse("cart:inc:1:1:extra"), None);
    assert_eq!(MenuCallback::parse("menu:info:"), None);
    assert_eq!(MenuCallback::parse("other:main"), None);
  }
}
