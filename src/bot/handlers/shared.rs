use super::format::{render_cart, render_my_orders, render_product};
use super::router::CallbackAction;
use super::state::BotState;
use crate::bot::keyboards;
use crate::cart::Cart;
use crate::db::{CustomerProfile, MessageSender, NewProduct, OrderStatus};
use crate::notify::forward_customer_message;
use std::path::PathBuf;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, InputFile, MessageId, ParseMode};

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub const GENERIC_FAILURE: &str = "❌ Xatolik yuz berdi. Iltimos, qaytadan urinib ko'ring.";

const MY_ORDERS_LIMIT: i64 = 10;

pub fn callback_message_target(q: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    q.message.as_ref().map(|msg| (msg.chat().id, msg.id()))
}

/// Payload of a `/start <payload>` deep link, URL-decoded.
pub fn parse_start_payload(text: &str) -> Option<String> {
    let mut parts = text.split_whitespace();
    let command = parts.next()?;
    if !command.starts_with("/start") {
        return None;
    }
    let payload = parts.next()?.trim();
    let decoded = match urlencoding::decode(payload) {
        Ok(value) => value.into_owned(),
        Err(_) => payload.to_string(),
    };
    let normalized = decoded.trim();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

/// `/start prod_<id>` opens the product card directly.
pub fn deep_link_product(payload: &str) -> Option<i64> {
    match CallbackAction::parse(payload) {
        CallbackAction::Product(id) => Some(id),
        _ => None,
    }
}

pub fn product_deep_link(bot_username: &str, product_id: i64) -> String {
    let normalized = bot_username.trim_start_matches('@');
    format!(
        "https://t.me/{}?start={}",
        normalized,
        CallbackAction::Product(product_id).to_data()
    )
}

/// Everything after the command word, with the inner spacing preserved.
pub fn command_args(text: &str) -> &str {
    text.trim()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

pub fn parse_orders_filter(args: &str) -> Result<Option<OrderStatus>, anyhow::Error> {
    let args = args.trim();
    if args.is_empty() {
        return Ok(None);
    }
    args.parse::<OrderStatus>().map(Some)
}

pub fn parse_set_status_args(args: &str) -> Option<(i64, OrderStatus)> {
    let mut parts = args.split_whitespace();
    let order_id = parts.next()?.trim_start_matches('#').parse::<i64>().ok()?;
    let status = parts.next()?.parse::<OrderStatus>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((order_id, status))
}

pub fn parse_reply_args(args: &str) -> Option<(i64, String)> {
    let (telegram_id, text) = args.trim().split_once(char::is_whitespace)?;
    let telegram_id = telegram_id.parse::<i64>().ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some((telegram_id, text.to_string()))
}

const MAX_PRODUCT_PRICE: i64 = 1_000_000_000_000;

pub fn parse_add_product_args(args: &str) -> Result<NewProduct, &'static str> {
    let mut rest = args.trim();
    let mut next_number = |what: &'static str| -> Result<i64, &'static str> {
        let (head, tail) = rest.split_once(char::is_whitespace).ok_or(what)?;
        rest = tail.trim_start();
        head.parse::<i64>().map_err(|_| what)
    };
    let category_id = next_number("kategoriya id noto'g'ri")?;
    let price = next_number("narx noto'g'ri")?;
    let stock = next_number("qoldiq noto'g'ri")?;
    if price <= 0 {
        return Err("narx musbat bo'lishi kerak");
    }
    if price > MAX_PRODUCT_PRICE {
        return Err("narx juda katta");
    }
    if stock < 0 {
        return Err("qoldiq manfiy bo'lmasligi kerak");
    }

    // optional image after a `|`
    let (name, image) = match rest.split_once('|') {
        Some((name, image)) => (name.trim(), Some(image.trim())),
        None => (rest.trim(), None),
    };
    if name.is_empty() {
        return Err("mahsulot nomi bo'sh");
    }
    Ok(NewProduct {
        category_id,
        name: name.to_string(),
        description: None,
        price,
        stock,
        images: image
            .filter(|image| !image.is_empty())
            .map(|image| vec![image.to_string()])
            .unwrap_or_default(),
    })
}

/// Site-relative paths (`/uploads/x.jpg`) live under the working directory,
/// next to the web admin's upload folder.
fn local_image_path(image: &str) -> PathBuf {
    if image.starts_with('/') {
        PathBuf::from(format!(".{}", image))
    } else {
        PathBuf::from(image)
    }
}

fn product_photo(image: &str) -> Option<InputFile> {
    if image.starts_with("http://") || image.starts_with("https://") {
        return url::Url::parse(image).ok().map(InputFile::url);
    }
    let path = local_image_path(image);
    path.is_file().then(|| InputFile::file(path))
}

pub async fn send_main_menu(bot: &Bot, chat_id: ChatId, text: &str) -> HandlerResult {
    bot.send_message(chat_id, text)
        .reply_markup(keyboards::main_menu())
        .await?;
    Ok(())
}

pub async fn send_categories(bot: &Bot, chat_id: ChatId, state: &BotState) -> HandlerResult {
    let categories = state.db.list_categories().await?;
    if categories.is_empty() {
        send_main_menu(bot, chat_id, "Hozircha kategoriyalar yo'q.").await?;
        return Ok(());
    }
    bot.send_message(chat_id, "📋 Kategoriyani tanlang:")
        .reply_markup(keyboards::categories(&categories))
        .await?;
    Ok(())
}

pub async fn send_category_products(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    category_id: i64,
) -> HandlerResult {
    let Some(category) = state.db.get_category(category_id).await? else {
        bot.send_message(chat_id, "Kategoriya topilmadi.").await?;
        return Ok(());
    };
    let products = state.db.list_products_by_category(category_id).await?;
    if products.is_empty() {
        bot.send_message(chat_id, "Bu kategoriyada mahsulotlar yo'q.")
            .reply_markup(keyboards::back_to_catalog())
            .await?;
        return Ok(());
    }
    bot.send_message(chat_id, format!("📁 {}\n\nMahsulotni tanlang:", category.name))
        .reply_markup(keyboards::products(&products, state.currency()))
        .await?;
    Ok(())
}

/// Product card with its first image when it can be sent, plain text otherwise.
pub async fn send_product(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    product_id: i64,
) -> HandlerResult {
    let Some(product) = state.db.get_product(product_id).await? else {
        bot.send_message(chat_id, "Mahsulot topilmadi.").await?;
        return Ok(());
    };
    let caption = render_product(&product, state.currency());
    let keyboard = keyboards::product_card(&product);

    if let Some(photo) = product.first_image().as_deref().and_then(product_photo) {
        let sent = bot
            .send_photo(chat_id, photo)
            .caption(caption.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard.clone())
            .await;
        match sent {
            Ok(_) => return Ok(()),
            Err(error) => {
                tracing::warn!(
                    product_id = product.id,
                    error = %error,
                    "Failed to send product photo, falling back to text"
                );
            }
        }
    }

    bot.send_message(chat_id, caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

pub async fn send_cart(bot: &Bot, chat_id: ChatId, cart: &Cart, currency: &str) -> HandlerResult {
    let request = bot
        .send_message(chat_id, render_cart(cart, currency))
        .parse_mode(ParseMode::Html);
    if cart.is_empty() {
        request.reply_markup(keyboards::main_menu()).await?;
    } else {
        request.reply_markup(keyboards::cart(cart)).await?;
    }
    Ok(())
}

/// Re-renders a cart message in place after a quantity change.
pub async fn edit_cart(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    cart: &Cart,
    currency: &str,
) -> HandlerResult {
    let markup = if cart.is_empty() {
        InlineKeyboardMarkup::default()
    } else {
        keyboards::cart(cart)
    };
    bot.edit_message_text(chat_id, message_id, render_cart(cart, currency))
        .parse_mode(ParseMode::Html)
        .reply_markup(markup)
        .await?;
    Ok(())
}

/// Shows the cart once `delay` has passed. The session lock is taken only
/// when rendering, so updates in between are reflected.
pub fn schedule_cart_render(bot: Bot, state: BotState, chat_id: ChatId, user_id: i64) {
    let delay = state.config.session.cart_render_delay();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let session = state.sessions.lock(user_id).await;
        if let Err(error) = send_cart(&bot, chat_id, &session.cart, state.currency()).await {
            tracing::warn!(user_id = user_id, error = %error, "Delayed cart render failed");
        }
    });
}

pub async fn send_my_orders(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    user_id: i64,
) -> HandlerResult {
    let orders = state
        .db
        .list_orders_by_telegram_id(user_id, MY_ORDERS_LIMIT)
        .await?;
    bot.send_message(chat_id, render_my_orders(&orders, state.currency()))
        .reply_markup(keyboards::main_menu())
        .await?;
    Ok(())
}

/// Stores a free-form customer message and forwards it to the admin chat.
pub async fn record_customer_message(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
    user_id: i64,
    profile: &CustomerProfile,
    text: &str,
) -> HandlerResult {
    let customer = state.db.get_or_create_customer(user_id, profile).await?;
    let message_id = state
        .db
        .create_message(customer.id, MessageSender::Customer, text)
        .await?;
    tracing::info!(
        user_id = user_id,
        customer_id = customer.id,
        message_id = message_id,
        "Customer message stored"
    );

    forward_customer_message(
        bot,
        state.admin_contacts(),
        user_id,
        profile,
        customer.phone_number.as_deref(),
        text,
    )
    .await;

    send_main_menu(
        bot,
        chat_id,
        "✅ Xabaringiz qabul qilindi. Tez orada javob beramiz.",
    )
    .await
}

pub async fn report_failure(bot: &Bot, chat_id: ChatId) {
    if let Err(error) = bot.send_message(chat_id, GENERIC_FAILURE).await {
        tracing::warn!(chat_id = chat_id.0, error = %error, "Failed to report error to user");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_payload_is_decoded() {
        assert_eq!(parse_start_payload("/start prod_12"), Some("prod_12".to_string()));
        assert_eq!(parse_start_payload("/start prod%5F7"), Some("prod_7".to_string()));
        assert_eq!(parse_start_payload("/start"), None);
        assert_eq!(parse_start_payload("hello prod_1"), None);
    }

    #[test]
    fn deep_link_accepts_only_products() {
        assert_eq!(deep_link_product("prod_12"), Some(12));
        assert_eq!(deep_link_product("cat_12"), None);
        assert_eq!(deep_link_product("prod_x"), None);
    }

    #[test]
    fn deep_link_round_trips() {
        let link = product_deep_link("@fresh_shop_bot", 42);
        assert_eq!(link, "https://t.me/fresh_shop_bot?start=prod_42");
        let payload = parse_start_payload(&format!("/start {}", "prod_42")).unwrap();
        assert_eq!(deep_link_product(&payload), Some(42));
    }

    #[test]
    fn command_args_keep_inner_spacing() {
        assert_eq!(command_args("/reply 42 hello  there"), "42 hello  there");
        assert_eq!(command_args("/stats"), "");
    }

    #[test]
    fn set_status_args() {
        assert_eq!(
            parse_set_status_args("15 processing"),
            Some((15, OrderStatus::Processing))
        );
        assert_eq!(
            parse_set_status_args("#3 cancelled"),
            Some((3, OrderStatus::Cancelled))
        );
        assert_eq!(parse_set_status_args("15"), None);
        assert_eq!(parse_set_status_args("15 shipped"), None);
        assert_eq!(parse_set_status_args("x new"), None);
    }

    #[test]
    fn orders_filter() {
        assert_eq!(parse_orders_filter("").unwrap(), None);
        assert_eq!(parse_orders_filter("new").unwrap(), Some(OrderStatus::New));
        assert!(parse_orders_filter("lost").is_err());
    }

    #[test]
    fn reply_args_need_text() {
        assert_eq!(
            parse_reply_args("1000 Buyurtmangiz yo'lda"),
            Some((1000, "Buyurtmangiz yo'lda".to_string()))
        );
        assert_eq!(parse_reply_args("1000"), None);
        assert_eq!(parse_reply_args("abc text"), None);
    }

    #[test]
    fn add_product_args() {
        let product = parse_add_product_args("2 15000 10 Green tea 100g").unwrap();
        assert_eq!(product.category_id, 2);
        assert_eq!(product.price, 15_000);
        assert_eq!(product.stock, 10);
        assert_eq!(product.name, "Green tea 100g");
        assert!(product.images.is_empty());

        let with_image =
            parse_add_product_args("2 15000 10 Tea | https://cdn.example.com/tea.jpg").unwrap();
        assert_eq!(with_image.name, "Tea");
        assert_eq!(with_image.images, vec!["https://cdn.example.com/tea.jpg"]);

        assert!(parse_add_product_args("2 0 10 Tea").is_err());
        assert!(parse_add_product_args("2 100 -1 Tea").is_err());
        assert!(parse_add_product_args("2 100 5").is_err());
        assert!(parse_add_product_args("x 100 5 Tea").is_err());
        assert!(parse_add_product_args("2 9223372036854775807 5 Tea").is_err());
        assert!(parse_add_product_args("2 1000000000000 5 Tea").is_ok());
    }

    #[test]
    fn site_relative_images_resolve_under_working_dir() {
        assert_eq!(
            local_image_path("/uploads/tea.jpg"),
            PathBuf::from("./uploads/tea.jpg")
        );
        assert_eq!(
            local_image_path("uploads/tea.jpg"),
            PathBuf::from("uploads/tea.jpg")
        );
        assert!(product_photo("/uploads/definitely-missing.jpg").is_none());
    }
}
