//! Bot keyboards: the persistent reply menu and inline buttons.

use crate::bot::handlers::CallbackAction;
use crate::cart::{format_amount, Cart, QuantityChange};
use crate::db::{Category, Product};
use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
    WebAppInfo,
};

pub const BTN_CATALOG: &str = "🛍 Katalog";
pub const BTN_CART: &str = "🛒 Savatcha";
pub const BTN_MY_ORDERS: &str = "📦 Buyurtmalarim";
pub const BTN_HELP: &str = "ℹ️ Yordam";
pub const BTN_SHARE_PHONE: &str = "📱 Raqamni yuborish";

fn callback(text: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.to_data())
}

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_CATALOG), KeyboardButton::new(BTN_CART)],
        vec![KeyboardButton::new(BTN_MY_ORDERS), KeyboardButton::new(BTN_HELP)],
    ])
    .resize_keyboard()
    .persistent()
}

pub fn share_phone() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(BTN_SHARE_PHONE).request(ButtonRequest::Contact),
    ]])
    .resize_keyboard()
    .one_time_keyboard()
}

pub fn storefront(webapp_url: &url::Url) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::web_app(
            "🛒 Do'konni ochish",
            WebAppInfo {
                url: webapp_url.clone(),
            },
        )])
        .append_row(vec![callback("📋 Kategoriyalar", CallbackAction::ShowCategories)])
}

pub fn categories(categories: &[Category]) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();
    for category in categories {
        keyboard = keyboard.append_row(vec![callback(
            format!("📁 {}", category.name),
            CallbackAction::Category(category.id),
        )]);
    }
    keyboard.append_row(vec![callback("🏠 Bosh menyu", CallbackAction::MainMenu)])
}

pub fn products(products: &[Product], currency: &str) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();
    for product in products {
        keyboard = keyboard.append_row(vec![callback(
            format!("{} - {}", product.name, format_amount(product.price, currency)),
            CallbackAction::Product(product.id),
        )]);
    }
    keyboard.append_row(vec![callback("⬅️ Orqaga", CallbackAction::BackToCatalog)])
}

pub fn back_to_catalog() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![callback("⬅️ Orqaga", CallbackAction::BackToCatalog)])
}

pub fn product_card(product: &Product) -> InlineKeyboardMarkup {
    let back = match product.category_id {
        Some(category_id) => CallbackAction::Category(category_id),
        None => CallbackAction::BackToCatalog,
    };
    InlineKeyboardMarkup::default()
        .append_row(vec![callback(
            "🛒 Savatga qo'shish",
            CallbackAction::Add(product.id),
        )])
        .append_row(vec![
            callback("🛒 Savatni ko'rish", CallbackAction::ViewCart),
            callback("⬅️ Orqaga", back),
        ])
}

/// One `- qty +` row and a delete row per line, then checkout and catalog.
pub fn cart(cart: &Cart) -> InlineKeyboardMarkup {
    let mut keyboard = InlineKeyboardMarkup::default();
    for line in cart.lines() {
        let id = line.product.id;
        keyboard = keyboard
            .append_row(vec![
                callback("➖", CallbackAction::Quantity(id, QuantityChange::Minus)),
                callback(line.quantity.to_string(), CallbackAction::Noop),
                callback("➕", CallbackAction::Quantity(id, QuantityChange::Plus)),
            ])
            .append_row(vec![callback(
                format!("❌ {}", line.product.name),
                CallbackAction::Delete(id),
            )]);
    }
    keyboard
        .append_row(vec![callback(
            "✅ Buyurtma berish",
            CallbackAction::Checkout,
        )])
        .append_row(vec![callback(
            "🛍 Xaridni davom ettirish",
            CallbackAction::BackToCatalog,
        )])
}

pub fn confirm_order() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![
        callback("✅ Tasdiqlash", CallbackAction::ConfirmOrder),
        callback("❌ Bekor qilish", CallbackAction::CancelOrder),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::ProductSnapshot;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_data(keyboard: &InlineKeyboardMarkup) -> Vec<String> {
        keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn cart_buttons_carry_parseable_actions() {
        let mut cart = Cart::default();
        cart.add_item(ProductSnapshot {
            id: 4,
            name: "Tea".to_string(),
            price: 100,
        });

        let data = callback_data(&super::cart(&cart));
        assert_eq!(
            data,
            vec![
                "qty_minus_4",
                "noop",
                "qty_plus_4",
                "del_4",
                "checkout",
                "back_to_catalog"
            ]
        );
        assert!(data
            .iter()
            .all(|data| CallbackAction::parse(data) != CallbackAction::Unknown));
    }

    #[test]
    fn product_card_goes_back_to_its_category() {
        let product = Product {
            id: 9,
            name: "Pear".to_string(),
            description: None,
            price: 5_000,
            category_id: Some(2),
            images: "[]".to_string(),
            stock: 1,
        };
        assert_eq!(
            callback_data(&product_card(&product)),
            vec!["add_9", "view_cart", "cat_2"]
        );
    }
}
