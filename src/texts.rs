//! Default captions for the informational banner pages.
//!
//! Seeded into the `banners` table at startup; admins replace the images
//! later through the admin panel, the descriptions stay editable in the db.

pub const MAIN_PAGE: &str = "main";
pub const CATALOG_PAGE: &str = "catalog";
pub const CART_PAGE: &str = "cart";

pub const INFO_PAGES: &[(&str, &str)] = &[
  (MAIN_PAGE, "👋 Welcome to the store! Pick a section below."),
  (CATALOG_PAGE, "🛍️ Our catalog, sorted by category."),
  (CART_PAGE, "🛒 Your cart is empty so far. Add something from the catalog!"),
  (
    "about",
    "ℹ️ We are a small family shop.\nOpen daily, 9:00-21:00.",
  ),
  (
    "payment",
    "💳 Payment options:\n- card in the bot\n- card on delivery\n- cash on delivery",
  ),
  (
    "shipping",
    "📦 Shipping options:\n- courier\n- post\n- pickup from the store",
  ),
];
