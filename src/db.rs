use anyhow::Result;
use anyhow::bail;
use sqlx::Pool;
use sqlx::Postgres;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use crate::models::BannerRow;
use crate::models::CartLine;
use crate::models::CategoryRow;
use crate::models::ProductRow;
use crate::models::UserRow;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Fields collected by the checkout conversation, ready to be stored.
#[derive(Debug, Clone)]
pub struct NewOrder {
  pub user_id: i64,
  pub full_name: String,
  pub postal_code: String,
  pub phone: String,
  pub address: Option<String>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

/// Everything needed to store a product row; shared by insert and update.
#[derive(Debug, Clone)]
pub struct ProductInput {
  pub name: String,
  pub description: String,
  pub details_url: Option<String>,
  pub price: i64,
  pub image: String,
  pub category_id: i64,
}

#[derive(Clone)]
pub struct Db {
  pool: Pool<Postgres>,
}

impl Db {
  pub async fn connect(database_url: &str) -> Result<Self> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool })
  }

  #[allow(dead_code)]
  pub fn pool(&self) -> &Pool<Postgres> {
    &self.pool
  }

  // ---- banners ----

  /// Seeds descriptions for the info pages. Existing banners keep their
  /// image and get the description refreshed only when it is still empty.
  #[instrument(skip(self, pages))]
  pub async fn seed_banner_descriptions(&self, pages: &[(&str, &str)]) -> Result<()> {
    for (name, description) in pages {
      sqlx::query(
        r#"
        INSERT INTO banners (name, description)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET
          description = COALESCE(banners.description, EXCLUDED.description)
        "#,
      )
      .bind(name)
      .bind(description)
      .execute(&self.pool)
      .await?;
    }
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn get_banner(&self, name: &str) -> Result<Option<BannerRow>> {
    let banner = sqlx::query_as::<_, BannerRow>(
      r#"SELECT id, name, image, description FROM banners WHERE name = $1 LIMIT 1"#,
    )
    .bind(name)
    .fetch_optional(&self.pool)
    .await?;
    Ok(banner)
  }

  #[instrument(skip(self))]
  pub async fn list_banners(&self) -> Result<Vec<BannerRow>> {
    let banners =
      sqlx::query_as::<_, BannerRow>(r#"SELECT id, name, image, description FROM banners ORDER BY id"#)
        .fetch_all(&self.pool)
        .await?;
    Ok(banners)
  }

  #[instrument(skip(self))]
  pub async fn set_banner_image(&self, name: &str, image: &str) -> Result<bool> {
    let result = sqlx::query(r#"UPDATE banners SET image = $2, updated_at = NOW() WHERE name = $1"#)
      .bind(name)
      .bind(image)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  // ---- categories ----

  #[instrument(skip(self))]
  pub async fn list_categories(&self) -> Result<Vec<CategoryRow>> {
    let categories = sqlx::query_as::<_, CategoryRow>(r#"SELECT id, name FROM categories ORDER BY name"#)
      .fetch_all(&self.pool)
      .await?;
    Ok(categories)
  }

  #[instrument(skip(self))]
  pub async fn get_category(&self, category_id: i64) -> Result<Option<CategoryRow>> {
    let category = sqlx::query_as::<_, CategoryRow>(r#"SELECT id, name FROM categories WHERE id = $1"#)
      .bind(category_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(category)
  }

  #[instrument(skip(self))]
  pub async fn find_category_by_name(&self, name: &str) -> Result<Option<CategoryRow>> {
    let category = sqlx::query_as::<_, CategoryRow>(
      r#"SELECT id, name FROM categories WHERE LOWER(name) = LOWER($1) LIMIT 1"#,
    )
    .bind(name)
    .fetch_optional(&self.pool)
    .await?;
    Ok(category)
  }

  #[instrument(skip(self))]
  pub async fn create_category(&self, name: &str) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(r#"INSERT INTO categories (name) VALUES ($1) RETURNING id"#)
      .bind(name)
      .fetch_one(&self.pool)
      .await?;
    Ok(id)
  }

  #[instrument(skip(self))]
  pub async fn rename_category(&self, category_id: i64, name: &str) -> Result<bool> {
    let result = sqlx::query(r#"UPDATE categories SET name = $2 WHERE id = $1"#)
      .bind(category_id)
      .bind(name)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(skip(self))]
  pub async fn delete_category(&self, category_id: i64) -> Result<bool> {
    let result = sqlx::query(r#"DELETE FROM categories WHERE id = $1"#)
      .bind(category_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  // ---- products ----

  #[instrument(skip(self))]
  pub async fn list_products(&self, category_id: i64) -> Result<Vec<ProductRow>> {
    let products = sqlx::query_as::<_, ProductRow>(
      r#"
      SELECT id, name, description, details_url, price, image, category_id
      FROM products
      WHERE category_id = $1
      ORDER BY id
      "#,
    )
    .bind(category_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(products)
  }

  #[instrument(skip(self))]
  pub async fn get_product(&self, product_id: i64) -> Result<Option<ProductRow>> {
    let product = sqlx::query_as::<_, ProductRow>(
      r#"
      SELECT id, name, description, details_url, price, image, category_id
      FROM products
      WHERE id = $1
      "#,
    )
    .bind(product_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(product)
  }

  #[instrument(skip(self, input))]
  pub async fn create_product(&self, input: &ProductInput) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
      r#"
      INSERT INTO products (name, description, details_url, price, image, category_id)
      VALUES ($1, $2, $3, $4, $5, $6)
      RETURNING id
      "#,
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(&input.details_url)
    .bind(input.price)
    .bind(&input.image)
    .bind(input.category_id)
    .fetch_one(&self.pool)
    .await?;
    Ok(id)
  }

  #[instrument(skip(self, input))]
  pub async fn update_product(&self, product_id: i64, input: &ProductInput) -> Result<bool> {
    let result = sqlx::query(
      r#"
      UPDATE products
      SET name = $2,
          description = $3,
          details_url = $4,
          price = $5,
          image = $6,
          category_id = $7,
          updated_at = NOW()
      WHERE id = $1
      "#,
    )
    .bind(product_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(&input.details_url)
    .bind(input.price)
    .bind(&input.image)
    .bind(input.category_id)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(skip(self))]
  pub async fn delete_product(&self, product_id: i64) -> Result<bool> {
    let result = sqlx::query(r#"DELETE FROM products WHERE id = $1"#)
      .bind(product_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  // ---- users ----

  #[instrument(skip(self))]
  pub async fn upsert_user(&self, id: i64, first_name: Option<String>, last_name: Option<String>) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO users (id, first_name, last_name)
      VALUES ($1, $2, $3)
      ON CONFLICT (id) DO UPDATE SET
        first_name = EXCLUDED.first_name,
        last_name = EXCLUDED.last_name
      "#,
    )
    .bind(id)
    .bind(first_name)
    .bind(last_name)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
    let user = sqlx::query_as::<_, UserRow>(
      r#"SELECT id, first_name, last_name, phone, is_admin, created_at FROM users WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(user)
  }

  #[instrument(skip(self))]
  pub async fn is_admin_user(&self, id: i64) -> Result<bool> {
    let is_admin: Option<bool> = sqlx::query_scalar(r#"SELECT is_admin FROM users WHERE id = $1"#)
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(is_admin.unwrap_or(false))
  }

  /// Grants or revokes the admin flag, creating the user row if needed.
  #[instrument(skip(self))]
  pub async fn set_admin(
    &self,
    id: i64,
    is_admin: bool,
    first_name: Option<String>,
    last_name: Option<String>,
  ) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO users (id, first_name, last_name, is_admin)
      VALUES ($1, $2, $3, $4)
      ON CONFLICT (id) DO UPDATE SET
        first_name = COALESCE(EXCLUDED.first_name, users.first_name),
        last_name = COALESCE(EXCLUDED.last_name, users.last_name),
        is_admin = EXCLUDED.is_admin
      "#,
    )
    .bind(id)
    .bind(first_name)
    .bind(last_name)
    .bind(is_admin)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn set_user_phone(&self, id: i64, phone: &str) -> Result<()> {
    sqlx::query(r#"UPDATE users SET phone = $2 WHERE id = $1"#)
      .bind(id)
      .bind(phone)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  // ---- cart ----

  /// Adds one unit of the product, creating the line on first add.
  /// Returns the resulting quantity.
  #[instrument(skip(self))]
  pub async fn add_to_cart(&self, user_id: i64, product_id: i64) -> Result<i32> {
    let quantity: i32 = sqlx::query_scalar(
      r#"
      INSERT INTO cart_items (user_id, product_id, quantity)
      VALUES ($1, $2, 1)
      ON CONFLICT (user_id, product_id) DO UPDATE SET
        quantity = cart_items.quantity + 1
      RETURNING quantity
      "#,
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(&self.pool)
    .await?;
    Ok(quantity)
  }

  /// Removes one unit; the line disappears when it hits zero.
  /// Returns whether the line still exists.
  #[instrument(skip(self))]
  pub async fn reduce_cart_item(&self, user_id: i64, product_id: i64) -> Result<bool> {
    let quantity: Option<i32> =
      sqlx::query_scalar(r#"SELECT quantity FROM cart_items WHERE user_id = $1 AND product_id = $2"#)
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

    match quantity {
      None => Ok(false),
      Some(quantity) if quantity > 1 => {
        sqlx::query(r#"UPDATE cart_items SET quantity = quantity - 1 WHERE user_id = $1 AND product_id = $2"#)
          .bind(user_id)
          .bind(product_id)
          .execute(&self.pool)
          .await?;
        Ok(true)
      },
      Some(_) => {
        self.remove_cart_item(user_id, product_id).await?;
        Ok(false)
      },
    }
  }

  #[instrument(skip(self))]
  pub async fn remove_cart_item(&self, user_id: i64, product_id: i64) -> Result<()> {
    sqlx::query(r#"DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2"#)
      .bind(user_id)
      .bind(product_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn list_cart(&self, user_id: i64) -> Result<Vec<CartLine>> {
    let lines = sqlx::query_as::<_, CartLine>(
      r#"
      SELECT c.product_id, c.quantity, p.name, p.price, p.image
      FROM cart_items c
      INNER JOIN products p ON p.id = c.product_id
      WHERE c.user_id = $1
      ORDER BY c.id
      "#,
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(lines)
  }

  // ---- orders ----

  /// Stores the order and its line items and clears the cart in one
  /// transaction. The total is recomputed from the live cart inside the
  /// transaction so a concurrently emptied cart cannot produce an order
  /// without items.
  #[instrument(skip(self, order))]
  pub async fn create_order(&self, order: &NewOrder) -> Result<i64> {
    let mut tx = self.pool.begin().await?;

    let lines = sqlx::query_as::<_, CartLine>(
      r#"
      SELECT c.product_id, c.quantity, p.name, p.price, p.image
      FROM cart_items c
      INNER JOIN products p ON p.id = c.product_id
      WHERE c.user_id = $1
      ORDER BY c.id
      "#,
    )
    .bind(order.user_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
      bail!("cart is empty, cannot create order");
    }

    let total: i64 = lines.iter().map(CartLine::subtotal).sum();

    let order_id: i64 = sqlx::query_scalar(
      r#"
      INSERT INTO orders (user_id, full_name, postal_code, phone, address, lat, lon, total_amount)
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
      RETURNING id
      "#,
    )
    .bind(order.user_id)
    .bind(&order.full_name)
    .bind(&order.postal_code)
    .bind(&order.phone)
    .bind(&order.address)
    .bind(order.lat)
    .bind(order.lon)
    .bind(total)
    .fetch_one(&mut *tx)
    .await?;

    for line in &lines {
      sqlx::query(
        r#"
        INSERT INTO order_items (order_id, product_id, price, quantity)
        VALUES ($1, $2, $3, $4)
        "#,
      )
      .bind(order_id)
      .bind(line.product_id)
      .bind(line.price)
      .bind(line.quantity)
      .execute(&mut *tx)
      .await?;
    }

    sqlx::query(r#"DELETE FROM cart_items WHERE user_id = $1"#)
      .bind(order.user_id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;
    Ok(order_id)
  }
}
