mod app;
mod bot;
mod config;
mod db;
mod location;
mod models;
mod telegraph;
mod telemetry;
mod texts;
mod util;

use anyhow::Result;
use teloxide::prelude::Bot;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
  telemetry::init()?;
  let config = config::Config::from_env()?;
  let admin_count = config.admins.len();
  info!(admin_count = admin_count, "starting bot");

  let bot = Bot::new(config.bot_token.clone());
  let db = db::Db::connect(&config.database_url).await?;
  db.seed_banner_descriptions(texts::INFO_PAGES).await?;
  let app = app::App::new(bot, db, config);
  app.run().await
}
