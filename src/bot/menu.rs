//! Builds the content of the single navigable storefront message: banner
//! image, caption, and inline keyboard for every menu screen.

use anyhow::Result;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::utils::html;
use tracing::instrument;

use crate::bot::callbacks::CartAction;
use crate::bot::callbacks::MenuCallback;
use crate::bot::context::AppContext;
use crate::models::CartLine;
use crate::models::CategoryRow;
use crate::models::ProductRow;
use crate::texts;
use crate::util::Paginator;
use crate::util::format_cents;

pub const CHECKOUT_CALLBACK: &str = "order:start";

/// One menu screen: optional banner/product photo (Telegram file id),
/// HTML caption, and the keyboard to go with it.
#[derive(Debug, Clone)]
pub struct MenuView {
  pub image: Option<String>,
  pub caption: String,
  pub keyboard: InlineKeyboardMarkup,
}

#[instrument(skip(ctx))]
pub async fn main_menu(ctx: &AppContext) -> Result<MenuView> {
  let banner = ctx.db().get_banner(texts::MAIN_PAGE).await?;
  let caption = banner
    .as_ref()
    .and_then(|b| b.description.clone())
    .filter(|text| !text.trim().is_empty())
    .unwrap_or_else(|| "🏠 What would you like to do?".to_string());
  Ok(MenuView {
    image: banner.and_then(|b| b.image),
    caption: html::escape(&caption),
    keyboard: main_menu_keyboard(),
  })
}

#[instrument(skip(ctx))]
pub async fn info_page(ctx: &AppContext, page: &str) -> Result<Option<MenuView>> {
  let Some(banner) = ctx.db().get_banner(page).await? else {
    return Ok(None);
  };
  let caption = banner
    .description
    .clone()
    .filter(|text| !text.trim().is_empty())
    .unwrap_or_else(|| format!("ℹ️ {page}"));
  Ok(Some(MenuView {
    image: banner.image,
    caption: html::escape(&caption),
    keyboard: back_to_main_keyboard(),
  }))
}

#[instrument(skip(ctx))]
pub async fn catalog(ctx: &AppContext) -> Result<MenuView> {
  let (banner, categories) =
    futures::future::try_join(ctx.db().get_banner(texts::CATALOG_PAGE), ctx.db().list_categories()).await?;
  let caption = if categories.is_empty() {
    "🗂️ No categories yet. Check back soon.".to_string()
  } else {
    banner
      .as_ref()
      .and_then(|b| b.description.clone())
      .filter(|text| !text.trim().is_empty())
      .map(|text| html::escape(&text))
      .unwrap_or_else(|| "🗂️ Choose a category:".to_string())
  };
  Ok(MenuView {
    image: banner.and_then(|b| b.image),
    caption,
    keyboard: catalog_keyboard(&categories),
  })
}

#[instrument(skip(ctx))]
pub async fn products(ctx: &AppContext, category_id: i64, page: usize) -> Result<MenuView> {
  let products = ctx.db().list_products(category_id).await?;
  let paginator = Paginator::new(&products, page);

  let Some(product) = paginator.items().first() else {
    let banner = ctx.db().get_banner(texts::CATALOG_PAGE).await?;
    return Ok(MenuView {
      image: banner.and_then(|b| b.image),
      caption: "📭 No products in this category yet.".to_string(),
      keyboard: back_to_catalog_keyboard(),
    });
  };

  Ok(MenuView {
    image: Some(product.image.clone()),
    caption: product_caption(product, paginator.page(), paginator.pages()),
    keyboard: products_keyboard(category_id, product.id, &paginator),
  })
}

#[instrument(skip(ctx))]
pub async fn cart(ctx: &AppContext, user_id: i64, page: usize) -> Result<MenuView> {
  let lines = ctx.db().list_cart(user_id).await?;

  let total: i64 = lines.iter().map(CartLine::subtotal).sum();
  let paginator = Paginator::new(&lines, page);
  let Some(line) = paginator.items().first() else {
    return empty_cart_view(ctx).await;
  };

  Ok(MenuView {
    image: Some(line.image.clone()),
    caption: cart_caption(line, paginator.page(), paginator.pages(), total),
    keyboard: cart_keyboard(line.product_id, &paginator),
  })
}

async fn empty_cart_view(ctx: &AppContext) -> Result<MenuView> {
  let banner = ctx.db().get_banner(texts::CART_PAGE).await?;
  let caption = banner
    .as_ref()
    .and_then(|b| b.description.clone())
    .filter(|text| !text.trim().is_empty())
    .unwrap_or_else(|| "🛒 Your cart is empty.".to_string());
  Ok(MenuView {
    image: banner.and_then(|b| b.image),
    caption: html::escape(&caption),
    keyboard: back_to_main_keyboard(),
  })
}

fn product_caption(product: &ProductRow, page: usize, pages: usize) -> String {
  let mut caption = format!("<b>{}</b>", html::escape(&product.name));

  if let Some(url) = product.details_url.as_deref() {
    caption.push_str(&format!("\n<a href=\"{}\">Details</a>", html::escape(url)));
  } else if !product.description.trim().is_empty() {
    caption.push_str(&format!("\n{}", html::escape(&product.description)));
  }

  caption.push_str(&format!("\nPrice: {}$", format_cents(product.price)));
  caption.push_str(&format!("\n<b>Product {page} of {pages}</b>"));
  caption
}

fn cart_caption(line: &CartLine, page: usize, pages: usize, total: i64) -> String {
  format!(
    "<b>{}</b>\n{}$ × {} = {}$\nProduct {page} of {pages} in the cart.\nCart total: {}$",
    html::escape(&line.name),
    format_cents(line.price),
    line.quantity,
    format_cents(line.subtotal()),
    format_cents(total),
  )
}

fn main_menu_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![
      InlineKeyboardButton::callback("🛍️ Catalog", MenuCallback::Catalog.to_string()),
      InlineKeyboardButton::callback("🛒 Cart", MenuCallback::Cart { page: 1 }.to_string()),
    ],
    vec![
      InlineKeyboardButton::callback("ℹ️ About", MenuCallback::Info("about".to_string()).to_string()),
      InlineKeyboardButton::callback("💳 Payment", MenuCallback::Info("payment".to_string()).to_string()),
    ],
    vec![InlineKeyboardButton::callback(
      "📦 Shipping",
      MenuCallback::Info("shipping".to_string()).to_string(),
    )],
  ])
}

fn catalog_keyboard(categories: &[CategoryRow]) -> InlineKeyboardMarkup {
  let mut rows = categories
    .chunks(2)
    .map(|row| {
      row
        .iter()
        .map(|category| {
          InlineKeyboardButton::callback(
            category.name.clone(),
            MenuCallback::Products {
              category_id: category.id,
              page: 1,
            }
            .to_string(),
          )
        })
        .collect::<Vec<_>>()
    })
    .collect::<Vec<_>>();

  rows.push(vec![InlineKeyboardButton::callback(
    "⬅️ Main menu",
    MenuCallback::Main.to_string(),
  )]);

  InlineKeyboardMarkup::new(rows)
}

fn back_to_main_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
    "⬅️ Main menu",
    MenuCallback::Main.to_string(),
  )]])
}

fn back_to_catalog_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![vec![
    InlineKeyboardButton::callback("⬅️ Catalog", MenuCallback::Catalog.to_string()),
    InlineKeyboardButton::callback("🏠 Main menu", MenuCallback::Main.to_string()),
  ]])
}

fn pagination_row<T>(paginator: &Paginator<'_, T>, previous: MenuCallback, next: MenuCallback) -> Vec<InlineKeyboardButton> {
  let mut row = Vec::new();
  if paginator.has_previous() {
    row.push(InlineKeyboardButton::callback("◀ Prev", previous.to_string()));
  }
  if paginator.has_next() {
    row.push(InlineKeyboardButton::callback("Next ▶", next.to_string()));
  }
  row
}

fn products_keyboard(category_id: i64, product_id: i64, paginator: &Paginator<'_, ProductRow>) -> InlineKeyboardMarkup {
  let mut rows = vec![vec![InlineKeyboardButton::callback(
    "🛒 Add to cart",
    MenuCallback::CartAction {
      action: CartAction::Add,
      product_id,
      page: paginator.page(),
    }
    .to_string(),
  )]];

  let pagination = pagination_row(
    paginator,
    MenuCallback::Products {
      category_id,
      page: paginator.page().saturating_sub(1),
    },
    MenuCallback::Products {
      category_id,
      page: paginator.page() + 1,
    },
  );
  if !pagination.is_empty() {
    rows.push(pagination);
  }

  rows.push(vec![
    InlineKeyboardButton::callback("⬅️ Catalog", MenuCallback::Catalog.to_string()),
    InlineKeyboardButton::callback("🏠 Main menu", MenuCallback::Main.to_string()),
  ]);

  InlineKeyboardMarkup::new(rows)
}

fn cart_keyboard(product_id: i64, paginator: &Paginator<'_, CartLine>) -> InlineKeyboardMarkup {
  let page = paginator.page();
  let action = |action| {
    MenuCallback::CartAction {
      action,
      product_id,
      page,
    }
    .to_string()
  };

  let mut rows = vec![vec![
    InlineKeyboardButton::callback("➖", action(CartAction::Decrement)),
    InlineKeyboardButton::callback("➕", action(CartAction::Increment)),
    InlineKeyboardButton::callback("❌ Remove", action(CartAction::Delete)),
  ]];

  let pagination = pagination_row(
    paginator,
    MenuCallback::Cart {
      page: page.saturating_sub(1),
    },
    MenuCallback::Cart { page: page + 1 },
  );
  if !pagination.is_empty() {
    rows.push(pagination);
  }

  rows.push(vec![InlineKeyboardButton::callback(
    "✅ Checkout",
    CHECKOUT_CALLBACK.to_string(),
  )]);
  rows.push(vec![InlineKeyboardButton::callback(
    "🏠 Main menu",
    MenuCallback::Main.to_string(),
  )]);

  InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
  use super::cart_caption;
  use super::cart_keyboard;
  use super::product_caption;
  use super::products_keyboard;
  use crate::models::CartLine;
  use crate::models::ProductRow;
  use crate::util::Paginator;

  fn product(details_url: Option<&str>) -> ProductRow {
    ProductRow {
      id: 5,
      name: "Green <tea>".to_string(),
      description: "Loose leaf".to_string(),
      details_url: details_url.map(str::to_string),
      price: 1250,
      image: "file".to_string(),
      category_id: 1,
    }
  }

  #[test]
  fn product_caption_escapes_and_counts_pages() {
    let caption = product_caption(&product(None), 2, 7);
    assert!(caption.contains("Green &lt;tea&gt;"));
    assert!(caption.contains("Loose leaf"));
    assert!(caption.contains("Price: 12.5$"));
    assert!(caption.contains("Product 2 of 7"));
  }

  #[test]
  fn product_caption_prefers_details_link() {
    let caption = product_caption(&product(Some("https://telegra.ph/tea")), 1, 1);
    assert!(caption.contains("<a href=\"https://telegra.ph/tea\">Details</a>"));
    assert!(!caption.contains("Loose leaf"));
  }

  #[test]
  fn cart_caption_shows_subtotal_and_total() {
    let line = CartLine {
      product_id: 5,
      quantity: 3,
      name: "Tea".to_string(),
      price: 450,
      image: "file".to_string(),
    };
    let caption = cart_caption(&line, 1, 2, 2000);
    assert!(caption.contains("4.5$ × 3 = 13.5$"));
    assert!(caption.contains("Product 1 of 2 in the cart."));
    assert!(caption.contains("Cart total: 20$"));
  }

  #[test]
  fn products_keyboard_hides_missing_pagination() {
    let products = vec![product(None)];
    let paginator = Paginator::new(&products, 1);
    let keyboard = products_keyboard(1, 5, &paginator);
    // add-to-cart row and the navigation footer, no pagination row
    assert_eq!(keyboard.inline_keyboard.len(), 2);
  }

  #[test]
  fn cart_keyboard_has_pagination_between_pages() {
    let lines = vec![
      CartLine {
        product_id: 1,
        quantity: 1,
        name: "A".to_string(),
        price: 100,
        image: "f".to_string(),
      },
      CartLine {
        product_id: 2,
        quantity: 1,
        name: "B".to_string(),
        price: 200,
        image: "f".to_string(),
      },
    ];
    let paginator = Paginator::new(&lines, 1);
    let keyboard = cart_keyboard(1, &paginator);
    // quantity row, pagination, checkout, main menu
    assert_eq!(keyboard.inline_keyboard.len(), 4);
    assert_eq!(keyboard.inline_keyboard[1].len(), 1);
    assert_eq!(keyboard.inline_keyboard[1][0].text, "Next ▶");
  }
}
