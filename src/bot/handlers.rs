use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::Dialogue;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::ButtonRequest;
use teloxide::types::CallbackQuery;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::InputFile;
use teloxide::types::InputMedia;
use teloxide::types::InputMediaPhoto;
use teloxide::types::KeyboardButton;
use teloxide::types::KeyboardMarkup;
use teloxide::types::KeyboardRemove;
use teloxide::types::Message;
use teloxide::types::MessageId;
use teloxide::types::ParseMode;
use teloxide::types::User;
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::Command;
use crate::bot::DialogueStorage;
use crate::bot::HandlerResult;
use crate::bot::callbacks::CartAction;
use crate::bot::callbacks::MenuCallback;
use crate::bot::context::AppContext;
use crate::bot::menu;
use crate::bot::menu::MenuView;
use crate::bot::state::CheckoutDraft;
use crate::bot::state::CheckoutStage;
use crate::bot::state::ConversationState;
use crate::bot::state::ProductDraft;
use crate::bot::state::ProductStage;
use crate::bot::state::RenameCategoryDraft;
use crate::db::NewOrder;
use crate::db::ProductInput;
use crate::location;
use crate::models::CartLine;
use crate::models::CategoryRow;
use crate::telegraph;
use crate::util::format_cents;
use crate::util::is_valid_full_name;
use crate::util::is_valid_postal_code;
use crate::util::normalize_phone_number;
use crate::util::parse_money_to_cents;
use crate::util::pretty_phone_number;

type SharedContext = Arc<AppContext>;
type BotDialogue = Dialogue<ConversationState, DialogueStorage>;

const PRODUCT_NAME_RANGE: std::ops::RangeInclusive<usize> = 5 ..= 150;
const CATEGORY_NAME_MAX: usize = 150;
const DESCRIPTION_MIN: usize = 5;

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message()
    .enter_dialogue::<Message, DialogueStorage, ConversationState>()
    .branch(command_branch())
    .branch(dptree::case![ConversationState::AddProduct(draft)].endpoint(handle_product_message))
    .branch(dptree::case![ConversationState::AddCategory { admin_tg_id }].endpoint(handle_add_category_message))
    .branch(dptree::case![ConversationState::RenameCategory(draft)].endpoint(handle_rename_category_message))
    .branch(dptree::case![ConversationState::SetBanner { admin_tg_id }].endpoint(handle_set_banner_message))
    .branch(dptree::case![ConversationState::Checkout(draft)].endpoint(handle_checkout_message))
    .branch(dptree::endpoint(handle_idle_text));

  let callback_handler = Update::filter_callback_query()
    .enter_dialogue::<CallbackQuery, DialogueStorage, ConversationState>()
    .endpoint(handle_callback_query);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn command_branch() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .filter_command::<Command>()
    .branch(dptree::case![Command::Start].endpoint(handle_start))
    .branch(dptree::case![Command::Help].endpoint(handle_help))
    .branch(dptree::case![Command::Admin].endpoint(handle_admin))
    .branch(dptree::case![Command::Cancel].endpoint(handle_cancel))
    .branch(dptree::case![Command::AddAdmin].endpoint(handle_add_admin))
    .branch(dptree::case![Command::RemoveAdmin].endpoint(handle_remove_admin))
}

// ---- commands ----

#[instrument(skip(bot, ctx, dialogue, msg))]
async fn handle_start(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  if !msg.chat.is_private() {
    return Ok(());
  }
  dialogue.reset().await?;
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  info!(user_id = user.id.0, chat_id = %msg.chat.id, "received /start command");

  let view = menu::main_menu(&ctx).await?;
  send_menu_view(&bot, msg.chat.id, view).await
}

#[instrument(skip(bot, msg))]
async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
  let mut text = Command::descriptions().to_string();
  text.push_str("\n\nBrowsing, cart, and checkout are all available from the on-screen menu buttons. Use /start to open the menu again.");
  bot.send_message(msg.chat.id, text).await?;
  Ok(())
}

#[instrument(skip(bot, ctx, dialogue, msg))]
async fn handle_admin(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  if !msg.chat.is_private() {
    return Ok(());
  }
  let user = msg.from.as_ref().context("message missing sender")?;
  if !ctx.is_admin(user.id.0 as i64).await? {
    return Ok(());
  }
  dialogue.reset().await?;
  info!(user_id = user.id.0, "opening admin panel");
  bot
    .send_message(msg.chat.id, "🛠️ Admin panel\n\nWhat would you like to do?")
    .reply_markup(admin_menu_keyboard())
    .await?;
  Ok(())
}

#[instrument(skip(bot, dialogue, msg))]
async fn handle_cancel(bot: Bot, dialogue: BotDialogue, msg: Message) -> HandlerResult {
  let state = dialogue.get().await?;
  dialogue.reset().await?;
  if matches!(state, Some(ConversationState::Idle) | None) {
    return Ok(());
  }
  bot
    .send_message(msg.chat.id, "❌ Action cancelled.")
    .reply_markup(KeyboardRemove::new())
    .await?;
  Ok(())
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_add_admin(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  change_admin_flag(&bot, &ctx, &msg, true).await
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_remove_admin(bot: Bot, ctx: SharedContext, msg: Message) -> HandlerResult {
  change_admin_flag(&bot, &ctx, &msg, false).await
}

async fn change_admin_flag(bot: &Bot, ctx: &SharedContext, msg: &Message, grant: bool) -> HandlerResult {
  if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
    return Ok(());
  }
  let requester = msg.from.as_ref().context("message missing sender")?;
  if !ctx.is_admin(requester.id.0 as i64).await? {
    return Ok(());
  }

  let Some(target) = resolve_admin_target(msg) else {
    let command = if grant { "/add_admin" } else { "/remove_admin" };
    bot
      .send_message(
        msg.chat.id,
        format!("Reply to the member's message with {command}, or pass their numeric Telegram id."),
      )
      .await?;
    return Ok(());
  };

  let already_admin = ctx
    .db()
    .get_user(target.id)
    .await?
    .map(|user| user.is_admin)
    .unwrap_or(false);
  if grant && already_admin {
    bot
      .send_message(msg.chat.id, format!("{} is already an admin.", target.label()))
      .await?;
    return Ok(());
  }
  if !grant && !already_admin {
    bot
      .send_message(msg.chat.id, format!("{} is not an admin.", target.label()))
      .await?;
    return Ok(());
  }

  ctx
    .db()
    .set_admin(target.id, grant, target.first_name.clone(), target.last_name.clone())
    .await?;
  info!(target_id = target.id, grant, "changed admin flag");

  let verb = if grant { "is now an admin" } else { "is no longer an admin" };
  bot
    .send_message(msg.chat.id, format!("{} {verb}.", target.label()))
    .await?;
  Ok(())
}

struct AdminTarget {
  id: i64,
  first_name: Option<String>,
  last_name: Option<String>,
}

impl AdminTarget {
  fn label(&self) -> String {
    match (&self.first_name, &self.last_name) {
      (Some(first), Some(last)) => format!("{first} {last}"),
      (Some(first), None) => first.clone(),
      _ => format!("id:{}", self.id),
    }
  }
}

fn resolve_admin_target(msg: &Message) -> Option<AdminTarget> {
  if let Some(user) = msg.reply_to_message().and_then(|reply| reply.from.as_ref())
    && !user.is_bot
  {
    return Some(AdminTarget {
      id: user.id.0 as i64,
      first_name: Some(user.first_name.clone()),
      last_name: user.last_name.clone(),
    });
  }

  let id = parse_user_id_argument(msg.text()?)?;
  Some(AdminTarget {
    id,
    first_name: None,
    last_name: None,
  })
}

/// Pulls a numeric Telegram id out of `/add_admin 12345`-style text.
fn parse_user_id_argument(text: &str) -> Option<i64> {
  let argument = text.split_whitespace().nth(1)?;
  let argument = argument.trim_matches(|c: char| !c.is_ascii_digit() && c != '-');
  argument.parse().ok().filter(|id| *id > 0)
}

// ---- menu rendering plumbing ----

fn is_not_modified(err: &RequestError) -> bool {
  matches!(err, RequestError::Api(ApiError::MessageNotModified))
}

async fn send_menu_view(bot: &Bot, chat: ChatId, view: MenuView) -> HandlerResult {
  match view.image {
    Some(image) => {
      bot
        .send_photo(chat, InputFile::file_id(image.into()))
        .caption(view.caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(view.keyboard)
        .await?;
    },
    None => {
      bot
        .send_message(chat, view.caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(view.keyboard)
        .await?;
    },
  }
  Ok(())
}

/// Edits the navigable menu message in place. Photo messages get a media
/// edit; everything else falls back to caption/text editing, mirroring
/// what Telegram allows for the original message type.
async fn edit_menu_view(bot: &Bot, chat: ChatId, message_id: MessageId, has_photo: bool, view: MenuView) -> HandlerResult {
  if has_photo && let Some(image) = view.image.clone() {
    let media = InputMediaPhoto::new(InputFile::file_id(image.into()))
      .caption(view.caption.clone())
      .parse_mode(ParseMode::Html);
    let request = bot
      .edit_message_media(chat, message_id, InputMedia::Photo(media))
      .reply_markup(view.keyboard.clone());
    match request.await {
      Ok(_) => return Ok(()),
      Err(err) if is_not_modified(&err) => return Ok(()),
      Err(err) => {
        warn!(error = %err, chat_id = %chat, "menu media edit failed, falling back to caption edit");
      },
    }
  }
  edit_message_text_or_caption(bot, chat, message_id, has_photo, view.caption, view.keyboard).await
}

/// Caption edit first for photo messages, text edit otherwise; the
/// `MessageNotModified` error is never worth surfacing.
async fn edit_message_text_or_caption(
  bot: &Bot,
  chat: ChatId,
  message_id: MessageId,
  has_photo: bool,
  text: String,
  keyboard: InlineKeyboardMarkup,
) -> HandlerResult {
  if has_photo {
    let request = bot
      .edit_message_caption(chat, message_id)
      .caption(text.clone())
      .parse_mode(ParseMode::Html)
      .reply_markup(keyboard.clone());
    match request.await {
      Ok(_) => return Ok(()),
      Err(err) if is_not_modified(&err) => return Ok(()),
      Err(err) => {
        warn!(error = %err, chat_id = %chat, "caption edit failed, retrying as text edit");
      },
    }
  }

  let request = bot
    .edit_message_text(chat, message_id, text)
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboard);
  match request.await {
    Ok(_) => Ok(()),
    Err(err) if is_not_modified(&err) => Ok(()),
    Err(err) => Err(err.into()),
  }
}

async fn delete_user_message(bot: &Bot, msg: &Message) {
  if let Err(err) = bot.delete_message(msg.chat.id, msg.id).await {
    info!(error = %err, chat_id = %msg.chat.id, "could not delete user message");
  }
}

async fn ensure_user_record(ctx: &SharedContext, user: &User) -> Result<()> {
  ctx
    .db()
    .upsert_user(user.id.0 as i64, Some(user.first_name.clone()), user.last_name.clone())
    .await
    .context("failed to upsert user record")
}

fn message_text(msg: &Message) -> Option<&str> {
  msg.text().or_else(|| msg.caption())
}

// ---- callback dispatch ----

#[instrument(skip(bot, ctx, dialogue, query))]
async fn handle_callback_query(
  bot: Bot,
  ctx: SharedContext,
  query: CallbackQuery,
  dialogue: BotDialogue,
) -> HandlerResult {
  ensure_user_record(&ctx, &query.from).await?;
  let user_id = query.from.id.0 as i64;
  let message_ctx = query.message.as_ref().map(|message| (message.chat().id, message.id()));
  let has_photo = query
    .regular_message()
    .map(|message| message.photo().is_some())
    .unwrap_or(false);
  let data = query.data.as_deref().unwrap_or_default();
  if let Some((chat_id, _)) = message_ctx {
    info!(user_id, chat_id = %chat_id, callback = data, "handling callback query");
  }

  let mut callback_text: Option<String> = None;
  let mut show_alert = false;

  if let Some(menu_callback) = MenuCallback::parse(data) {
    callback_text = handle_menu_callback(&bot, &ctx, &dialogue, menu_callback, user_id, message_ctx, has_photo).await?;
  } else if let Some(value) = data.strip_prefix("order:") {
    let (text, alert) = handle_order_callback(&bot, &ctx, &dialogue, value, user_id, message_ctx, has_photo).await?;
    callback_text = text;
    show_alert = alert;
  } else if let Some(value) = data.strip_prefix("admcat:") {
    callback_text = handle_product_category_pick(&bot, &ctx, &dialogue, value, user_id, message_ctx).await?;
  } else if let Some(value) = data.strip_prefix("admin:") {
    if ctx.is_admin(user_id).await? {
      callback_text = handle_admin_callback(&bot, &ctx, &dialogue, value, user_id, message_ctx).await?;
    } else {
      callback_text = Some("🛡️ Admins only.".to_string());
    }
  }

  let mut answer = bot.answer_callback_query(query.id);
  if let Some(text) = callback_text {
    answer = answer.text(text);
  }
  if show_alert {
    answer = answer.show_alert(true);
  }
  answer.await?;
  Ok(())
}

async fn handle_menu_callback(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  callback: MenuCallback,
  user_id: i64,
  message_ctx: Option<(ChatId, MessageId)>,
  has_photo: bool,
) -> Result<Option<String>> {
  let Some((chat_id, message_id)) = message_ctx else {
    return Ok(None);
  };

  match callback {
    MenuCallback::Main => {
      dialogue.reset().await?;
      let view = menu::main_menu(ctx).await?;
      edit_menu_view(bot, chat_id, message_id, has_photo, view).await?;
    },
    MenuCallback::Catalog => {
      dialogue.reset().await?;
      let view = menu::catalog(ctx).await?;
      edit_menu_view(bot, chat_id, message_id, has_photo, view).await?;
    },
    MenuCallback::Info(page) => match menu::info_page(ctx, &page).await? {
      Some(view) => edit_menu_view(bot, chat_id, message_id, has_photo, view).await?,
      None => return Ok(Some("❓ Page not found".to_string())),
    },
    MenuCallback::Products { category_id, page } => {
      let view = menu::products(ctx, category_id, page).await?;
      edit_menu_view(bot, chat_id, message_id, has_photo, view).await?;
    },
    MenuCallback::Cart { page } => {
      let view = menu::cart(ctx, user_id, page).await?;
      edit_menu_view(bot, chat_id, message_id, has_photo, view).await?;
    },
    MenuCallback::CartAction {
      action,
      product_id,
      page,
    } => {
      return handle_cart_action(bot, ctx, action, product_id, page, user_id, chat_id, message_id, has_photo).await;
    },
  }
  Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn handle_cart_action(
  bot: &Bot,
  ctx: &SharedContext,
  action: CartAction,
  product_id: i64,
  page: usize,
  user_id: i64,
  chat_id: ChatId,
  message_id: MessageId,
  has_photo: bool,
) -> Result<Option<String>> {
  let mut page = page;
  let callback_text = match action {
    CartAction::Add => {
      if ctx.db().get_product(product_id).await?.is_none() {
        return Ok(Some("❓ Product not found".to_string()));
      }
      let quantity = ctx.db().add_to_cart(user_id, product_id).await?;
      info!(user_id, product_id, quantity, "added product to cart");
      // the product page itself does not change
      return Ok(Some(format!("🛒 Added to cart ({quantity})")));
    },
    CartAction::Increment => {
      ctx.db().add_to_cart(user_id, product_id).await?;
      Some("➕ One more".to_string())
    },
    CartAction::Decrement => {
      let still_there = ctx.db().reduce_cart_item(user_id, product_id).await?;
      if !still_there && page > 1 {
        page -= 1;
      }
      Some("➖ One less".to_string())
    },
    CartAction::Delete => {
      ctx.db().remove_cart_item(user_id, product_id).await?;
      if page > 1 {
        page -= 1;
      }
      Some("❌ Removed from cart".to_string())
    },
  };

  let view = menu::cart(ctx, user_id, page).await?;
  edit_menu_view(bot, chat_id, message_id, has_photo, view).await?;
  Ok(callback_text)
}

// ---- checkout ----

async fn handle_order_callback(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  value: &str,
  user_id: i64,
  message_ctx: Option<(ChatId, MessageId)>,
  has_photo: bool,
) -> Result<(Option<String>, bool)> {
  let Some((chat_id, message_id)) = message_ctx else {
    return Ok((None, false));
  };

  if value == "start" {
    let lines = ctx.db().list_cart(user_id).await?;
    if lines.is_empty() {
      return Ok((Some("🛒 Your cart is empty.".to_string()), true));
    }

    let total: i64 = lines.iter().map(CartLine::subtotal).sum();
    let text = review_text(&cart_summary_lines(&lines), total);
    edit_message_text_or_caption(bot, chat_id, message_id, has_photo, text, confirmation_keyboard()).await?;

    let draft = CheckoutDraft::new(user_id, chat_id.0, message_id);
    dialogue.update(ConversationState::Checkout(draft)).await?;
    info!(user_id, chat_id = %chat_id, "started checkout");
    return Ok((None, false));
  }

  let Some(ConversationState::Checkout(mut draft)) = dialogue.get().await? else {
    return Ok((Some("This step has expired. Open the cart again.".to_string()), false));
  };
  if draft.user_id != user_id {
    return Ok((Some("Another checkout is already in progress.".to_string()), false));
  }
  let anchor_chat = ChatId(draft.anchor_chat_id);
  let anchor_message = draft.anchor_message_id;

  match value {
    "confirm" if draft.stage == CheckoutStage::Review => {
      draft.stage = CheckoutStage::FullName;
      edit_message_text_or_caption(
        bot,
        anchor_chat,
        anchor_message,
        has_photo,
        full_name_prompt(),
        back_keyboard("order:back:review"),
      )
      .await?;
      dialogue.update(ConversationState::Checkout(draft)).await?;
    },
    "back:cart" => {
      cleanup_contact_prompt(bot, anchor_chat, &mut draft).await;
      dialogue.reset().await?;
      let view = menu::cart(ctx, user_id, 1).await?;
      edit_menu_view(bot, anchor_chat, anchor_message, has_photo, view).await?;
      return Ok((Some("🛒 Back to the cart".to_string()), false));
    },
    "back:review" if draft.stage == CheckoutStage::FullName => {
      draft.rewind_to(CheckoutStage::Review);
      let lines = ctx.db().list_cart(user_id).await?;
      let total: i64 = lines.iter().map(CartLine::subtotal).sum();
      let text = review_text(&cart_summary_lines(&lines), total);
      edit_message_text_or_caption(bot, anchor_chat, anchor_message, has_photo, text, confirmation_keyboard()).await?;
      dialogue.update(ConversationState::Checkout(draft)).await?;
    },
    "back:name" if draft.stage == CheckoutStage::PostalCode => {
      draft.rewind_to(CheckoutStage::FullName);
      edit_message_text_or_caption(
        bot,
        anchor_chat,
        anchor_message,
        has_photo,
        full_name_prompt(),
        back_keyboard("order:back:review"),
      )
      .await?;
      dialogue.update(ConversationState::Checkout(draft)).await?;
    },
    "back:postal" if draft.stage == CheckoutStage::Phone => {
      cleanup_contact_prompt(bot, anchor_chat, &mut draft).await;
      draft.rewind_to(CheckoutStage::PostalCode);
      edit_message_text_or_caption(
        bot,
        anchor_chat,
        anchor_message,
        has_photo,
        postal_code_prompt(),
        back_keyboard("order:back:name"),
      )
      .await?;
      dialogue.update(ConversationState::Checkout(draft)).await?;
    },
    "back:phone" if draft.stage == CheckoutStage::Confirm => {
      draft.rewind_to(CheckoutStage::Phone);
      draft.phone = None;
      edit_message_text_or_caption(
        bot,
        anchor_chat,
        anchor_message,
        has_photo,
        phone_prompt(),
        back_keyboard("order:back:postal"),
      )
      .await?;
      let prompt = bot
        .send_message(anchor_chat, "Share your contact with the button below or type the number.")
        .reply_markup(contact_keyboard())
        .await?;
      draft.contact_prompt_message_id = Some(prompt.id);
      dialogue.update(ConversationState::Checkout(draft)).await?;
    },
    "submit" if draft.stage == CheckoutStage::Confirm => {
      return submit_order(bot, ctx, dialogue, &draft, has_photo).await;
    },
    _ => {
      info!(user_id, callback = value, stage = ?draft.stage, "ignoring out-of-step checkout callback");
    },
  }
  Ok((None, false))
}

#[instrument(skip(bot, ctx, dialogue, msg, draft))]
async fn handle_checkout_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  mut draft: CheckoutDraft,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if user.id.0 as i64 != draft.user_id {
    return Ok(());
  }
  let anchor_chat = ChatId(draft.anchor_chat_id);
  let anchor_message = draft.anchor_message_id;
  // the anchor is the cart menu message, a photo in the normal flow
  let has_photo = true;

  match draft.stage {
    CheckoutStage::Review | CheckoutStage::Confirm => {
      // these steps are driven by buttons
      delete_user_message(&bot, &msg).await;
    },
    CheckoutStage::FullName => {
      let Some(full_name) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
        delete_user_message(&bot, &msg).await;
        return Ok(());
      };
      if !is_valid_full_name(full_name) {
        edit_message_text_or_caption(
          &bot,
          anchor_chat,
          anchor_message,
          has_photo,
          "<b>Step 1 of 3</b>\n\nPlease provide the recipient's full name (first and last name).\nFor example: Jane Ann Doe.".to_string(),
          back_keyboard("order:back:review"),
        )
        .await?;
        delete_user_message(&bot, &msg).await;
        return Ok(());
      }

      draft.full_name = Some(full_name.to_string());
      draft.stage = CheckoutStage::PostalCode;
      edit_message_text_or_caption(
        &bot,
        anchor_chat,
        anchor_message,
        has_photo,
        postal_code_prompt(),
        back_keyboard("order:back:name"),
      )
      .await?;
      dialogue.update(ConversationState::Checkout(draft)).await?;
      delete_user_message(&bot, &msg).await;
    },
    CheckoutStage::PostalCode => {
      if let Some(point) = msg.location() {
        let address = location::reverse_geocode(point.latitude, point.longitude)
          .await
          .map(|raw| location::prettify_address(&raw));
        draft.lat = Some(point.latitude);
        draft.lon = Some(point.longitude);
        let note = match &address {
          Some(address) => format!("📍 Address noted: {}", html::escape(address)),
          None => "📍 Location saved, but the address could not be resolved.".to_string(),
        };
        draft.address = address;
        edit_message_text_or_caption(
          &bot,
          anchor_chat,
          anchor_message,
          has_photo,
          format!("{}\n\n{note}", postal_code_prompt()),
          back_keyboard("order:back:name"),
        )
        .await?;
        dialogue.update(ConversationState::Checkout(draft)).await?;
        delete_user_message(&bot, &msg).await;
        return Ok(());
      }

      let Some(postal_code) = msg.text().map(str::trim).filter(|t| !t.is_empty()) else {
        delete_user_message(&bot, &msg).await;
        return Ok(());
      };
      if !is_valid_postal_code(postal_code) {
        edit_message_text_or_caption(
          &bot,
          anchor_chat,
          anchor_message,
          has_photo,
          "<b>Step 2 of 3</b>\n\nThe postal code must be 5-6 digits. Try again.".to_string(),
          back_keyboard("order:back:name"),
        )
        .await?;
        delete_user_message(&bot, &msg).await;
        return Ok(());
      }

      draft.postal_code = Some(postal_code.to_string());
      draft.stage = CheckoutStage::Phone;
      edit_message_text_or_caption(
        &bot,
        anchor_chat,
        anchor_message,
        has_photo,
        phone_prompt(),
        back_keyboard("order:back:postal"),
      )
      .await?;
      let prompt = bot
        .send_message(anchor_chat, "Share your contact with the button below or type the number.")
        .reply_markup(contact_keyboard())
        .await?;
      draft.contact_prompt_message_id = Some(prompt.id);
      dialogue.update(ConversationState::Checkout(draft)).await?;
      delete_user_message(&bot, &msg).await;
    },
    CheckoutStage::Phone => {
      let raw_phone = if let Some(contact) = msg.contact() {
        if contact.user_id.is_some() && contact.user_id != Some(user.id) {
          edit_message_text_or_caption(
            &bot,
            anchor_chat,
            anchor_message,
            has_photo,
            "<b>Step 3 of 3</b>\n\nOnly your own contact can be used. Try again.".to_string(),
            back_keyboard("order:back:postal"),
          )
          .await?;
          delete_user_message(&bot, &msg).await;
          return Ok(());
        }
        Some(contact.phone_number.clone())
      } else {
        msg.text().map(str::to_string)
      };

      let normalized = raw_phone.as_deref().and_then(normalize_phone_number);
      let Some(normalized) = normalized else {
        edit_message_text_or_caption(
          &bot,
          anchor_chat,
          anchor_message,
          has_photo,
          "<b>Step 3 of 3</b>\n\nThat does not look like a phone number. Try again.".to_string(),
          back_keyboard("order:back:postal"),
        )
        .await?;
        delete_user_message(&bot, &msg).await;
        return Ok(());
      };

      ctx.db().set_user_phone(draft.user_id, &normalized).await?;
      draft.phone = Some(pretty_phone_number(&normalized));
      draft.stage = CheckoutStage::Confirm;
      cleanup_contact_prompt(&bot, anchor_chat, &mut draft).await;

      let lines = ctx.db().list_cart(draft.user_id).await?;
      let total: i64 = lines.iter().map(CartLine::subtotal).sum();
      let summary = order_summary_text(&draft, &cart_summary_lines(&lines), total);
      edit_message_text_or_caption(
        &bot,
        anchor_chat,
        anchor_message,
        has_photo,
        format!("{summary}\n\nIf everything is correct, submit the order."),
        final_review_keyboard(),
      )
      .await?;
      dialogue.update(ConversationState::Checkout(draft)).await?;
      delete_user_message(&bot, &msg).await;
    },
  }

  Ok(())
}

async fn submit_order(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  draft: &CheckoutDraft,
  has_photo: bool,
) -> Result<(Option<String>, bool)> {
  let anchor_chat = ChatId(draft.anchor_chat_id);
  let (Some(full_name), Some(postal_code), Some(phone)) = (&draft.full_name, &draft.postal_code, &draft.phone) else {
    dialogue.reset().await?;
    return Ok((Some("Checkout data is incomplete. Start again from the cart.".to_string()), true));
  };

  let lines = ctx.db().list_cart(draft.user_id).await?;
  if lines.is_empty() {
    dialogue.reset().await?;
    return Ok((Some("🛒 Your cart is empty.".to_string()), true));
  }
  let total: i64 = lines.iter().map(CartLine::subtotal).sum();

  let order = NewOrder {
    user_id: draft.user_id,
    full_name: full_name.clone(),
    postal_code: postal_code.clone(),
    phone: phone.clone(),
    address: draft.address.clone(),
    lat: draft.lat,
    lon: draft.lon,
  };
  let order_id = ctx.db().create_order(&order).await?;
  info!(order_id, user_id = draft.user_id, total, "order submitted");

  let summary_lines = cart_summary_lines(&lines);
  let completion = format!(
    "<b>Order #{order_id} placed!</b>\n\n{}\n\nOur manager will contact you to confirm.",
    order_summary_text(draft, &summary_lines, total),
  );
  edit_message_text_or_caption(
    bot,
    anchor_chat,
    draft.anchor_message_id,
    has_photo,
    completion,
    completed_keyboard(),
  )
  .await?;

  if let Some(orders_chat_id) = ctx.orders_chat_id() {
    let notification = admin_order_notification(order_id, draft, &summary_lines, total);
    if let Err(err) = bot
      .send_message(ChatId(orders_chat_id), notification)
      .parse_mode(ParseMode::Html)
      .await
    {
      warn!(error = %err, order_id, "failed to notify the orders chat");
    }
  }

  dialogue.reset().await?;
  Ok((Some("✅ Order sent! We will contact you soon.".to_string()), false))
}

async fn cleanup_contact_prompt(bot: &Bot, chat: ChatId, draft: &mut CheckoutDraft) {
  let Some(prompt_id) = draft.contact_prompt_message_id.take() else {
    return;
  };
  if let Err(err) = bot.delete_message(chat, prompt_id).await {
    info!(error = %err, chat_id = %chat, "could not delete contact prompt");
  }
  // Telegram only drops a reply keyboard together with a message that
  // carries ReplyKeyboardRemove, so send one and delete it right away.
  match bot.send_message(chat, "✅").reply_markup(KeyboardRemove::new()).await {
    Ok(removal) => {
      if let Err(err) = bot.delete_message(chat, removal.id).await {
        info!(error = %err, chat_id = %chat, "could not delete keyboard removal message");
      }
    },
    Err(err) => {
      info!(error = %err, chat_id = %chat, "could not send keyboard removal message");
    },
  }
}

fn cart_summary_lines(lines: &[CartLine]) -> Vec<String> {
  lines
    .iter()
    .enumerate()
    .map(|(index, line)| {
      format!(
        "{}. {} — {}$ × {} = {}$",
        index + 1,
        html::escape(&line.name),
        format_cents(line.price),
        line.quantity,
        format_cents(line.subtotal()),
      )
    })
    .collect()
}

fn cart_block(lines: &[String]) -> String {
  if lines.is_empty() {
    "The cart is empty.".to_string()
  } else {
    lines
      .iter()
      .map(|line| format!("• {line}"))
      .collect::<Vec<_>>()
      .join("\n")
  }
}

fn review_text(lines: &[String], total: i64) -> String {
  format!(
    "<b>Checkout</b>\n\nCheck your cart before continuing.\n\n<b>Cart:</b>\n{}\n\n<b>Total:</b> {}$\n\nPress \"Confirm\" to continue or \"Back\" to return.",
    cart_block(lines),
    format_cents(total),
  )
}

fn full_name_prompt() -> String {
  "<b>Step 1 of 3</b>\n\nEnter the recipient's full name.\nFor example: Jane Ann Doe.".to_string()
}

fn postal_code_prompt() -> String {
  "<b>Step 2 of 3</b>\n\nEnter the postal code (5-6 digits).\nYou can also share a location to attach a delivery address.".to_string()
}

fn phone_prompt() -> String {
  "<b>Step 3 of 3</b>\n\nSend your phone number.\nShare your contact with the button below or type it manually.".to_string()
}

fn order_summary_text(draft: &CheckoutDraft, lines: &[String], total: i64) -> String {
  let dash = "—".to_string();
  let full_name = draft.full_name.as_ref().unwrap_or(&dash);
  let postal_code = draft.postal_code.as_ref().unwrap_or(&dash);
  let phone = draft.phone.as_ref().unwrap_or(&dash);

  let mut text = format!(
    "<b>Check your order details</b>\n\nName: {}\nPostal code: {}\nPhone: {}",
    html::escape(full_name),
    html::escape(postal_code),
    html::escape(phone),
  );
  if let Some(address) = draft.address.as_deref() {
    text.push_str(&format!("\nAddress: {}", html::escape(address)));
  }
  text.push_str(&format!(
    "\n\n<b>Cart:</b>\n{}\n\n<b>Total:</b> {}$",
    cart_block(lines),
    format_cents(total),
  ));
  text
}

fn admin_order_notification(order_id: i64, draft: &CheckoutDraft, lines: &[String], total: i64) -> String {
  let dash = "—".to_string();
  let items_block = if lines.is_empty() {
    "—".to_string()
  } else {
    lines
      .iter()
      .map(|line| format!("🛍️ {line}"))
      .collect::<Vec<_>>()
      .join("\n")
  };

  let mut text = format!(
    "📦 <b>New order #{order_id}</b>\n👤 <b>Name:</b> {}\n📮 <b>Postal code:</b> {}\n📞 <b>Phone:</b> {}",
    html::escape(draft.full_name.as_ref().unwrap_or(&dash)),
    html::escape(draft.postal_code.as_ref().unwrap_or(&dash)),
    html::escape(draft.phone.as_ref().unwrap_or(&dash)),
  );
  if let Some(address) = draft.address.as_deref() {
    text.push_str(&format!("\n📍 <b>Address:</b> {}", html::escape(address)));
  }
  text.push_str(&format!(
    "\n\n🧾 <b>Items:</b>\n{items_block}\n\n💰 <b>Total:</b> {}$",
    format_cents(total),
  ));
  text
}

fn confirmation_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![vec![
    InlineKeyboardButton::callback("Confirm", "order:confirm".to_string()),
    InlineKeyboardButton::callback("Back", "order:back:cart".to_string()),
  ]])
}

fn back_keyboard(data: &str) -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("Back", data.to_string())]])
}

fn final_review_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![InlineKeyboardButton::callback("Submit order", "order:submit".to_string())],
    vec![InlineKeyboardButton::callback("Back", "order:back:phone".to_string())],
    vec![InlineKeyboardButton::callback(
      "🏠 Main menu",
      MenuCallback::Main.to_string(),
    )],
  ])
}

fn completed_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![InlineKeyboardButton::callback(
      "🏠 Main menu",
      MenuCallback::Main.to_string(),
    )],
    vec![InlineKeyboardButton::callback(
      "🛍️ Catalog",
      MenuCallback::Catalog.to_string(),
    )],
  ])
}

fn contact_keyboard() -> KeyboardMarkup {
  KeyboardMarkup::new(vec![vec![
    KeyboardButton::new("📱 Share contact").request(ButtonRequest::Contact),
  ]])
  .resize_keyboard()
  .one_time_keyboard()
}

// ---- admin panel ----

fn admin_menu_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![
      InlineKeyboardButton::callback("📦 Add product", "admin:add_product".to_string()),
      InlineKeyboardButton::callback("🗂️ Catalog", "admin:catalog".to_string()),
    ],
    vec![
      InlineKeyboardButton::callback("🏷️ Categories", "admin:categories".to_string()),
      InlineKeyboardButton::callback("🖼️ Banner", "admin:banner".to_string()),
    ],
  ])
}

fn admin_categories_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![InlineKeyboardButton::callback(
      "🆕 Add category",
      "admin:add_category".to_string(),
    )],
    vec![InlineKeyboardButton::callback(
      "✏️ Rename category",
      "admin:rename_category".to_string(),
    )],
    vec![InlineKeyboardButton::callback(
      "🗑 Delete category",
      "admin:delete_category".to_string(),
    )],
    vec![InlineKeyboardButton::callback("⬅️ Admin menu", "admin:menu".to_string())],
  ])
}

fn category_pick_keyboard(categories: &[CategoryRow], prefix: &str, back: &str) -> InlineKeyboardMarkup {
  let mut rows = categories
    .chunks(2)
    .map(|row| {
      row
        .iter()
        .map(|category| InlineKeyboardButton::callback(category.name.clone(), format!("{prefix}{}", category.id)))
        .collect::<Vec<_>>()
    })
    .collect::<Vec<_>>();
  rows.push(vec![InlineKeyboardButton::callback("⬅️ Back", back.to_string())]);
  InlineKeyboardMarkup::new(rows)
}

async fn edit_or_send_text(
  bot: &Bot,
  chat: ChatId,
  message_id: Option<MessageId>,
  text: String,
  keyboard: Option<InlineKeyboardMarkup>,
) -> HandlerResult {
  if let Some(message_id) = message_id {
    let mut request = bot.edit_message_text(chat, message_id, text.clone());
    if let Some(keyboard) = keyboard.clone() {
      request = request.reply_markup(keyboard);
    }
    match request.await {
      Ok(_) => return Ok(()),
      Err(err) if is_not_modified(&err) => return Ok(()),
      Err(err) => {
        info!(error = %err, chat_id = %chat, "edit failed, sending a new message");
      },
    }
  }
  let mut request = bot.send_message(chat, text);
  if let Some(keyboard) = keyboard {
    request = request.reply_markup(keyboard);
  }
  request.await?;
  Ok(())
}

async fn handle_admin_callback(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  value: &str,
  user_id: i64,
  message_ctx: Option<(ChatId, MessageId)>,
) -> Result<Option<String>> {
  let Some((chat_id, message_id)) = message_ctx else {
    return Ok(None);
  };

  match value {
    "menu" => {
      dialogue.reset().await?;
      edit_or_send_text(
        bot,
        chat_id,
        Some(message_id),
        "🛠️ Admin panel\n\nWhat would you like to do?".to_string(),
        Some(admin_menu_keyboard()),
      )
      .await?;
    },
    "add_product" => {
      dialogue.reset().await?;
      dialogue
        .update(ConversationState::AddProduct(ProductDraft::new(user_id, None)))
        .await?;
      edit_or_send_text(bot, chat_id, Some(message_id), "📦 Enter the product name:".to_string(), None).await?;
      return Ok(Some("📦 Starting product creation.".to_string()));
    },
    "catalog" => {
      let categories = ctx.db().list_categories().await?;
      if categories.is_empty() {
        edit_or_send_text(
          bot,
          chat_id,
          Some(message_id),
          "🗂️ No categories yet. Add one first.".to_string(),
          Some(admin_menu_keyboard()),
        )
        .await?;
      } else {
        edit_or_send_text(
          bot,
          chat_id,
          Some(message_id),
          "🗂️ Choose a category:".to_string(),
          Some(category_pick_keyboard(&categories, "admin:cat:", "admin:menu")),
        )
        .await?;
      }
    },
    "categories" => {
      dialogue.reset().await?;
      edit_or_send_text(
        bot,
        chat_id,
        Some(message_id),
        "🏷️ Category management".to_string(),
        Some(admin_categories_keyboard()),
      )
      .await?;
    },
    "add_category" => {
      dialogue.reset().await?;
      dialogue
        .update(ConversationState::AddCategory { admin_tg_id: user_id })
        .await?;
      edit_or_send_text(
        bot,
        chat_id,
        Some(message_id),
        "🆕 Send the new category name (or type cancel):".to_string(),
        None,
      )
      .await?;
      return Ok(Some("🆕 Waiting for the category name.".to_string()));
    },
    "rename_category" => {
      let categories = ctx.db().list_categories().await?;
      if categories.is_empty() {
        return Ok(Some("❓ No categories to rename.".to_string()));
      }
      edit_or_send_text(
        bot,
        chat_id,
        Some(message_id),
        "✏️ Choose a category to rename:".to_string(),
        Some(category_pick_keyboard(&categories, "admin:ren:", "admin:categories")),
      )
      .await?;
    },
    "delete_category" => {
      let categories = ctx.db().list_categories().await?;
      if categories.is_empty() {
        return Ok(Some("❓ No categories to delete.".to_string()));
      }
      edit_or_send_text(
        bot,
        chat_id,
        Some(message_id),
        "🗑 Choose a category to delete (its products go with it):".to_string(),
        Some(category_pick_keyboard(&categories, "admin:del:", "admin:categories")),
      )
      .await?;
    },
    "banner" => {
      let pages: Vec<String> = ctx.db().list_banners().await?.into_iter().map(|b| b.name).collect();
      dialogue.reset().await?;
      dialogue
        .update(ConversationState::SetBanner { admin_tg_id: user_id })
        .await?;
      edit_or_send_text(
        bot,
        chat_id,
        Some(message_id),
        format!(
          "🖼️ Send the banner photo with a caption naming the page it is for:\n{}",
          pages.join(", "),
        ),
        None,
      )
      .await?;
      return Ok(Some("🖼️ Waiting for the banner photo.".to_string()));
    },
    other => {
      if let Some((action, id_str)) = other.split_once(':')
        && let Ok(id) = id_str.parse::<i64>()
      {
        return handle_admin_id_callback(bot, ctx, dialogue, action, id, user_id, chat_id, message_id).await;
      }
    },
  }
  Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn handle_admin_id_callback(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  action: &str,
  id: i64,
  user_id: i64,
  chat_id: ChatId,
  message_id: MessageId,
) -> Result<Option<String>> {
  match action {
    "cat" => {
      let Some(category) = ctx.db().get_category(id).await? else {
        return Ok(Some("❓ Category not found".to_string()));
      };
      let count = send_admin_product_cards(bot, ctx, chat_id, id).await?;
      let text = if count == 0 {
        format!("📭 No products in \"{}\" yet.", category.name)
      } else {
        format!("OK, \"{}\" products are listed above ⏫", category.name)
      };
      edit_or_send_text(bot, chat_id, None, text, Some(admin_menu_keyboard())).await?;
    },
    "delprod" => {
      if ctx.db().delete_product(id).await? {
        info!(admin_tg_id = user_id, product_id = id, "product deleted");
        edit_or_send_text(
          bot,
          chat_id,
          None,
          format!("🗑 Product #{id} deleted."),
          Some(admin_menu_keyboard()),
        )
        .await?;
        return Ok(Some("🗑 Product deleted".to_string()));
      }
      return Ok(Some("❓ Product not found".to_string()));
    },
    "editprod" => {
      let Some(product) = ctx.db().get_product(id).await? else {
        return Ok(Some("❓ Product not found".to_string()));
      };
      dialogue.reset().await?;
      dialogue
        .update(ConversationState::AddProduct(ProductDraft::new(user_id, Some(product))))
        .await?;
      edit_or_send_text(
        bot,
        chat_id,
        None,
        "✏️ Enter the product name (send . to keep the current value):".to_string(),
        None,
      )
      .await?;
      return Ok(Some("✏️ Editing the product.".to_string()));
    },
    "ren" => {
      let Some(category) = ctx.db().get_category(id).await? else {
        return Ok(Some("❓ Category not found".to_string()));
      };
      dialogue.reset().await?;
      dialogue
        .update(ConversationState::RenameCategory(RenameCategoryDraft {
          admin_tg_id: user_id,
          category_id: category.id,
          old_name: category.name.clone(),
        }))
        .await?;
      edit_or_send_text(
        bot,
        chat_id,
        Some(message_id),
        format!("✏️ Enter the new name for \"{}\":", category.name),
        None,
      )
      .await?;
    },
    "del" => {
      let Some(category) = ctx.db().get_category(id).await? else {
        return Ok(Some("❓ Category not found".to_string()));
      };
      let product_count = ctx.db().list_products(id).await?.len();
      if ctx.db().delete_category(id).await? {
        info!(admin_tg_id = user_id, category_id = id, product_count, "category deleted");
        edit_or_send_text(
          bot,
          chat_id,
          Some(message_id),
          format!(
            "🗑 Category \"{}\" deleted along with {product_count} product(s).",
            category.name,
          ),
          Some(admin_menu_keyboard()),
        )
        .await?;
        return Ok(Some("🗑 Category deleted".to_string()));
      }
      return Ok(Some("❓ Category not found".to_string()));
    },
    _ => {},
  }
  Ok(None)
}

async fn send_admin_product_cards(bot: &Bot, ctx: &SharedContext, chat: ChatId, category_id: i64) -> Result<usize> {
  let products = ctx.db().list_products(category_id).await?;
  for product in &products {
    let caption = format!(
      "<b>{}</b>\n{}\nPrice: {}$",
      html::escape(&product.name),
      html::escape(&product.description),
      format_cents(product.price),
    );
    let keyboard = InlineKeyboardMarkup::new(vec![vec![
      InlineKeyboardButton::callback("🗑 Delete", format!("admin:delprod:{}", product.id)),
      InlineKeyboardButton::callback("✏️ Edit", format!("admin:editprod:{}", product.id)),
    ]]);
    bot
      .send_photo(chat, InputFile::file_id(product.image.clone().into()))
      .caption(caption)
      .parse_mode(ParseMode::Html)
      .reply_markup(keyboard)
      .await?;
  }
  Ok(products.len())
}

async fn handle_product_category_pick(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  value: &str,
  user_id: i64,
  message_ctx: Option<(ChatId, MessageId)>,
) -> Result<Option<String>> {
  let Some((chat_id, message_id)) = message_ctx else {
    return Ok(None);
  };
  let Ok(category_id) = value.parse::<i64>() else {
    return Ok(None);
  };

  let Some(ConversationState::AddProduct(mut draft)) = dialogue.get().await? else {
    return Ok(Some("This step has expired.".to_string()));
  };
  if draft.admin_tg_id != user_id || draft.stage != ProductStage::Category {
    return Ok(Some("Pick a category when the flow asks for it.".to_string()));
  }

  if ctx.db().get_category(category_id).await?.is_none() {
    return Ok(Some("❓ Category not found".to_string()));
  }

  draft.category_id = Some(category_id);
  draft.stage = ProductStage::Price;
  dialogue.update(ConversationState::AddProduct(draft)).await?;
  edit_or_send_text(
    bot,
    chat_id,
    Some(message_id),
    "💰 Now enter the price (e.g. 12.50):".to_string(),
    None,
  )
  .await?;
  Ok(Some("🗂️ Category selected.".to_string()))
}

// ---- admin FSM message handlers ----

#[instrument(skip(bot, ctx, dialogue, msg, draft))]
async fn handle_product_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  mut draft: ProductDraft,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if user.id.0 as i64 != draft.admin_tg_id {
    bot
      .send_message(msg.chat.id, "Only the admin who started this action can respond.")
      .await?;
    return Ok(());
  }
  let chat_id = msg.chat.id;
  let text = message_text(&msg).map(str::trim).filter(|t| !t.is_empty());

  if matches!(text, Some(value) if value.eq_ignore_ascii_case("cancel")) {
    dialogue.reset().await?;
    bot
      .send_message(chat_id, "❌ Product creation cancelled.")
      .reply_markup(admin_menu_keyboard())
      .await?;
    return Ok(());
  }

  let keep_previous = matches!(text, Some(".")) && draft.editing.is_some();
  info!(admin_tg_id = draft.admin_tg_id, stage = ?draft.stage, "handling product draft input");

  match draft.stage {
    ProductStage::Name => {
      let name = if keep_previous {
        draft.editing.as_ref().map(|p| p.name.clone())
      } else {
        text.map(str::to_string)
      };
      let Some(name) = name else {
        bot.send_message(chat_id, "📦 Please send the product name as text.").await?;
        return Ok(());
      };
      if !keep_previous && !PRODUCT_NAME_RANGE.contains(&name.chars().count()) {
        bot
          .send_message(chat_id, "The name must be 5-150 characters. Try again.")
          .await?;
        return Ok(());
      }
      draft.name = Some(name);
      draft.stage = ProductStage::Description;
      dialogue.update(ConversationState::AddProduct(draft)).await?;
      bot.send_message(chat_id, "🧾 Enter the product description:").await?;
    },
    ProductStage::Description => {
      let description = if keep_previous {
        draft.editing.as_ref().map(|p| p.description.clone())
      } else {
        text.map(str::to_string)
      };
      let Some(description) = description else {
        bot
          .send_message(chat_id, "🧾 Please send the description as text.")
          .await?;
        return Ok(());
      };
      if !keep_previous && description.chars().count() < DESCRIPTION_MIN {
        bot.send_message(chat_id, "That description is too short. Try again.").await?;
        return Ok(());
      }
      draft.description = Some(description);
      draft.stage = ProductStage::Category;
      dialogue.update(ConversationState::AddProduct(draft)).await?;

      let categories = ctx.db().list_categories().await?;
      if categories.is_empty() {
        bot
          .send_message(chat_id, "🗂️ No categories exist yet. Add one from the admin panel first.")
          .await?;
        return Ok(());
      }
      bot
        .send_message(chat_id, "🗂️ Choose a category:")
        .reply_markup(category_pick_keyboard(&categories, "admcat:", "admin:menu"))
        .await?;
    },
    ProductStage::Category => {
      bot.send_message(chat_id, "🗂️ Pick a category with the buttons above.").await?;
    },
    ProductStage::Price => {
      let price = if keep_previous {
        draft.editing.as_ref().map(|p| p.price)
      } else {
        match text.map(parse_money_to_cents) {
          Some(Ok(value)) => Some(value),
          Some(Err(err)) => {
            bot.send_message(chat_id, format!("⚠️ Invalid price: {err}")).await?;
            return Ok(());
          },
          None => None,
        }
      };
      let Some(price) = price else {
        bot.send_message(chat_id, "💰 Send the price in 0.00 format.").await?;
        return Ok(());
      };
      draft.price = Some(price);
      draft.stage = ProductStage::Image;
      dialogue.update(ConversationState::AddProduct(draft)).await?;
      bot.send_message(chat_id, "🖼️ Now send the product photo:").await?;
    },
    ProductStage::Image => {
      let image = if let Some(photo) = msg.photo().and_then(|photos| photos.last()) {
        Some(photo.file.id.to_string())
      } else if keep_previous {
        draft.editing.as_ref().map(|p| p.image.clone())
      } else {
        None
      };
      let Some(image) = image else {
        bot.send_message(chat_id, "🖼️ Send a photo of the product.").await?;
        return Ok(());
      };

      finalize_product_draft(&bot, &ctx, &dialogue, chat_id, &draft, image).await?;
    },
  }

  Ok(())
}

async fn finalize_product_draft(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  chat_id: ChatId,
  draft: &ProductDraft,
  image: String,
) -> HandlerResult {
  let name = draft.name.clone().context("missing product name at finalization")?;
  let description = draft
    .description
    .clone()
    .context("missing product description at finalization")?;
  let category_id = draft.category_id.context("missing category at finalization")?;
  let price = draft.price.context("missing price at finalization")?;

  // keep an existing page url while the description has not changed
  let mut details_url = match &draft.editing {
    Some(previous) if previous.description == description => previous.details_url.clone(),
    _ => None,
  };
  if details_url.is_none() && description.chars().count() > telegraph::DETAILS_THRESHOLD {
    match telegraph::create_page(ctx.telegraph_token(), &name, &description).await {
      Ok(url) => details_url = Some(url),
      Err(err) => {
        warn!(error = %err, "telegraph publish failed, keeping the inline description");
      },
    }
  }

  let input = ProductInput {
    name,
    description,
    details_url,
    price,
    image,
    category_id,
  };

  let saved = match &draft.editing {
    Some(previous) => {
      let updated = ctx.db().update_product(previous.id, &input).await?;
      info!(product_id = previous.id, updated, "product updated");
      updated
    },
    None => {
      let product_id = ctx.db().create_product(&input).await?;
      info!(product_id, "product created");
      true
    },
  };

  dialogue.reset().await?;
  let text = if saved {
    "✅ Product saved."
  } else {
    "❓ The product no longer exists."
  };
  bot
    .send_message(chat_id, text)
    .reply_markup(admin_menu_keyboard())
    .await?;
  Ok(())
}

#[instrument(skip(bot, ctx, dialogue, msg))]
async fn handle_add_category_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  admin_tg_id: i64,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if user.id.0 as i64 != admin_tg_id {
    bot
      .send_message(msg.chat.id, "Only the admin who started this action can respond.")
      .await?;
    return Ok(());
  }

  let Some(raw_text) = message_text(&msg).map(str::trim).filter(|t| !t.is_empty()) else {
    bot
      .send_message(msg.chat.id, "🆕 Send the new category name or type cancel to stop.")
      .await?;
    return Ok(());
  };

  if raw_text.eq_ignore_ascii_case("cancel") {
    dialogue.reset().await?;
    bot
      .send_message(msg.chat.id, "❌ Category creation cancelled.")
      .reply_markup(admin_menu_keyboard())
      .await?;
    return Ok(());
  }

  if raw_text.chars().count() > CATEGORY_NAME_MAX {
    bot
      .send_message(msg.chat.id, "The category name must be at most 150 characters. Try again.")
      .await?;
    return Ok(());
  }

  if ctx.db().find_category_by_name(raw_text).await?.is_some() {
    bot
      .send_message(msg.chat.id, "A category with this name already exists. Send another name.")
      .await?;
    return Ok(());
  }

  let category_id = ctx.db().create_category(raw_text).await?;
  info!(admin_tg_id, category_id, "category created");
  dialogue.reset().await?;
  bot
    .send_message(msg.chat.id, format!("✅ Category \"{raw_text}\" added."))
    .reply_markup(admin_menu_keyboard())
    .await?;
  Ok(())
}

#[instrument(skip(bot, ctx, dialogue, msg, draft))]
async fn handle_rename_category_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  draft: RenameCategoryDraft,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if user.id.0 as i64 != draft.admin_tg_id {
    bot
      .send_message(msg.chat.id, "Only the admin who started this action can respond.")
      .await?;
    return Ok(());
  }

  let Some(new_name) = message_text(&msg).map(str::trim).filter(|t| !t.is_empty()) else {
    bot
      .send_message(msg.chat.id, "✏️ Send the new category name or type cancel to stop.")
      .await?;
    return Ok(());
  };

  if new_name.eq_ignore_ascii_case("cancel") {
    dialogue.reset().await?;
    bot
      .send_message(msg.chat.id, "❌ Category rename cancelled.")
      .reply_markup(admin_menu_keyboard())
      .await?;
    return Ok(());
  }

  if new_name.chars().count() > CATEGORY_NAME_MAX {
    bot
      .send_message(msg.chat.id, "The category name must be at most 150 characters. Try again.")
      .await?;
    return Ok(());
  }

  if let Some(existing) = ctx.db().find_category_by_name(new_name).await?
    && existing.id != draft.category_id
  {
    bot
      .send_message(msg.chat.id, "A category with this name already exists. Send another name.")
      .await?;
    return Ok(());
  }

  if ctx.db().rename_category(draft.category_id, new_name).await? {
    info!(
      admin_tg_id = draft.admin_tg_id,
      category_id = draft.category_id,
      "category renamed"
    );
    dialogue.reset().await?;
    bot
      .send_message(
        msg.chat.id,
        format!("✅ Category \"{}\" renamed to \"{new_name}\".", draft.old_name),
      )
      .reply_markup(admin_menu_keyboard())
      .await?;
  } else {
    dialogue.reset().await?;
    bot
      .send_message(msg.chat.id, "❓ The category no longer exists.")
      .reply_markup(admin_menu_keyboard())
      .await?;
  }
  Ok(())
}

#[instrument(skip(bot, ctx, dialogue, msg))]
async fn handle_set_banner_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  admin_tg_id: i64,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if user.id.0 as i64 != admin_tg_id {
    bot
      .send_message(msg.chat.id, "Only the admin who started this action can respond.")
      .await?;
    return Ok(());
  }

  if matches!(msg.text().map(str::trim), Some(value) if value.eq_ignore_ascii_case("cancel")) {
    dialogue.reset().await?;
    bot
      .send_message(msg.chat.id, "❌ Banner update cancelled.")
      .reply_markup(admin_menu_keyboard())
      .await?;
    return Ok(());
  }

  let pages: Vec<String> = ctx.db().list_banners().await?.into_iter().map(|b| b.name).collect();
  let Some(photo) = msg.photo().and_then(|photos| photos.last()) else {
    bot
      .send_message(
        msg.chat.id,
        format!("🖼️ Send a photo with a caption naming one of: {}", pages.join(", ")),
      )
      .await?;
    return Ok(());
  };

  let Some(page) = msg.caption().map(str::trim).filter(|c| !c.is_empty()) else {
    bot
      .send_message(
        msg.chat.id,
        format!("🖼️ Add a caption naming the page: {}", pages.join(", ")),
      )
      .await?;
    return Ok(());
  };

  let page = page.to_lowercase();
  if !ctx.db().set_banner_image(&page, &photo.file.id.to_string()).await? {
    bot
      .send_message(
        msg.chat.id,
        format!("❓ Unknown page \"{page}\". Use one of: {}", pages.join(", ")),
      )
      .await?;
    return Ok(());
  }

  info!(admin_tg_id, page, "banner image updated");
  dialogue.reset().await?;
  bot
    .send_message(msg.chat.id, format!("✅ Banner for \"{page}\" updated."))
    .reply_markup(admin_menu_keyboard())
    .await?;
  Ok(())
}

#[instrument(skip(bot, msg))]
async fn handle_idle_text(bot: Bot, msg: Message, state: ConversationState) -> HandlerResult {
  if matches!(state, ConversationState::Idle)
    && msg.chat.is_private()
    && let Some(text) = msg.text()
  {
    if text.starts_with('/') {
      // unknown command, ignore to let telegram handle
    } else {
      info!(chat_id = %msg.chat.id, "idle state received unrecognized message");
      bot
        .send_message(msg.chat.id, "I did not understand that. Use the menu buttons or /help.")
        .await?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use teloxide::types::MessageId;

  use super::admin_order_notification;
  use super::cart_block;
  use super::cart_summary_lines;
  use super::order_summary_text;
  use super::parse_user_id_argument;
  use super::review_text;
  use crate::bot::state::CheckoutDraft;
  use crate::models::CartLine;

  fn lines() -> Vec<CartLine> {
    vec![
      CartLine {
        product_id: 1,
        quantity: 2,
        name: "Black tea".to_string(),
        price: 450,
        image: "f1".to_string(),
      },
      CartLine {
        product_id: 2,
        quantity: 1,
        name: "Mug <large>".to_string(),
        price: 1200,
        image: "f2".to_string(),
      },
    ]
  }

  fn draft() -> CheckoutDraft {
    let mut draft = CheckoutDraft::new(42, 42, MessageId(7));
    draft.full_name = Some("Jane Ann Doe".to_string());
    draft.postal_code = Some("123456".to_string());
    draft.phone = Some("+7 916 123 45 67".to_string());
    draft
  }

  #[test]
  fn summary_lines_number_and_escape_items() {
    let lines = cart_summary_lines(&lines());
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "1. Black tea — 4.5$ × 2 = 9$");
    assert!(lines[1].contains("Mug &lt;large&gt;"));
  }

  #[test]
  fn cart_block_handles_empty_cart() {
    assert_eq!(cart_block(&[]), "The cart is empty.");
    let block = cart_block(&["1. x".to_string()]);
    assert_eq!(block, "• 1. x");
  }

  #[test]
  fn review_text_includes_total() {
    let text = review_text(&cart_summary_lines(&lines()), 2100);
    assert!(text.contains("<b>Total:</b> 21$"));
    assert!(text.contains("• 1. Black tea"));
  }

  #[test]
  fn order_summary_lists_contact_fields() {
    let text = order_summary_text(&draft(), &cart_summary_lines(&lines()), 2100);
    assert!(text.contains("Name: Jane Ann Doe"));
    assert!(text.contains("Postal code: 123456"));
    assert!(text.contains("Phone: +7 916 123 45 67"));
    assert!(!text.contains("Address:"));
  }

  #[test]
  fn order_summary_includes_address_when_present() {
    let mut draft = draft();
    draft.address = Some("12 Main St, Springfield".to_string());
    let text = order_summary_text(&draft, &[], 0);
    assert!(text.contains("Address: 12 Main St, Springfield"));
  }

  #[test]
  fn admin_notification_mentions_order_number() {
    let text = admin_order_notification(77, &draft(), &cart_summary_lines(&lines()), 2100);
    assert!(text.contains("New order #77"));
    assert!(text.contains("🛍️ 1. Black tea"));
    assert!(text.contains("<b>Total:</b> 21$"));
  }

  #[test]
  fn parses_user_id_arguments() {
    assert_eq!(parse_user_id_argument("/add_admin 12345"), Some(12345));
    assert_eq!(parse_user_id_argument("/add_admin (12345)"), Some(12345));
    assert_eq!(parse_user_id_argument("/add_admin"), None);
    assert_eq!(parse_user_id_argument("/add_admin @someone"), None);
  }
}
