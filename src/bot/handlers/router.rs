//! Classification of incoming updates into a closed set of events.

use crate::bot::keyboards::{BTN_CART, BTN_CATALOG, BTN_HELP, BTN_MY_ORDERS};
use crate::cart::QuantityChange;
use teloxide::types::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Catalog,
    Cart,
    MyOrders,
    Help,
}

impl MenuAction {
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim() {
            BTN_CATALOG => Some(MenuAction::Catalog),
            BTN_CART => Some(MenuAction::Cart),
            BTN_MY_ORDERS => Some(MenuAction::MyOrders),
            BTN_HELP => Some(MenuAction::Help),
            _ => None,
        }
    }
}

/// A message that was not taken by the command branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Slash command the bot does not know.
    Command(String),
    Menu(MenuAction),
    /// Phone number from a shared contact.
    SharedPhone(String),
    FreeText(String),
    /// Stickers, photos and other content without text.
    Unsupported,
}

impl Inbound {
    pub fn classify(text: Option<&str>, contact_phone: Option<&str>) -> Self {
        if let Some(phone) = contact_phone {
            return Inbound::SharedPhone(phone.to_string());
        }
        let Some(text) = text else {
            return Inbound::Unsupported;
        };
        if text.starts_with('/') {
            return Inbound::Command(text.to_string());
        }
        match MenuAction::from_text(text) {
            Some(action) => Inbound::Menu(action),
            None => Inbound::FreeText(text.to_string()),
        }
    }

    /// Unknown commands and non-text content are acknowledged silently.
    pub fn is_ignored(&self) -> bool {
        matches!(self, Inbound::Command(_) | Inbound::Unsupported)
    }

    pub fn from_message(msg: Message) -> Self {
        Self::classify(
            msg.text(),
            msg.contact().map(|contact| contact.phone_number.as_str()),
        )
    }
}

/// Action encoded in inline-button callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    ShowCategories,
    BackToCatalog,
    Category(i64),
    Product(i64),
    Add(i64),
    Quantity(i64, QuantityChange),
    Delete(i64),
    ViewCart,
    Checkout,
    ConfirmOrder,
    CancelOrder,
    MainMenu,
    /// Label-only buttons.
    Noop,
    Unknown,
}

fn id_after(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        match data {
            "show_categories" => return CallbackAction::ShowCategories,
            "back_to_catalog" => return CallbackAction::BackToCatalog,
            "view_cart" => return CallbackAction::ViewCart,
            "checkout" => return CallbackAction::Checkout,
            "confirm_order" => return CallbackAction::ConfirmOrder,
            "cancel_order" => return CallbackAction::CancelOrder,
            "main_menu" => return CallbackAction::MainMenu,
            "noop" => return CallbackAction::Noop,
            _ => {}
        }

        id_after(data, "qty_plus_")
            .map(|id| CallbackAction::Quantity(id, QuantityChange::Plus))
            .or_else(|| {
                id_after(data, "qty_minus_")
                    .map(|id| CallbackAction::Quantity(id, QuantityChange::Minus))
            })
            .or_else(|| id_after(data, "cat_").map(CallbackAction::Category))
            .or_else(|| id_after(data, "prod_").map(CallbackAction::Product))
            .or_else(|| id_after(data, "add_").map(CallbackAction::Add))
            .or_else(|| id_after(data, "del_").map(CallbackAction::Delete))
            .unwrap_or(CallbackAction::Unknown)
    }

    pub fn to_data(self) -> String {
        match self {
            CallbackAction::ShowCategories => "show_categories".to_string(),
            CallbackAction::BackToCatalog => "back_to_catalog".to_string(),
            CallbackAction::Category(id) => format!("cat_{}", id),
            CallbackAction::Product(id) => format!("prod_{}", id),
            CallbackAction::Add(id) => format!("add_{}", id),
            CallbackAction::Quantity(id, QuantityChange::Plus) => format!("qty_plus_{}", id),
            CallbackAction::Quantity(id, QuantityChange::Minus) => format!("qty_minus_{}", id),
            CallbackAction::Delete(id) => format!("del_{}", id),
            CallbackAction::ViewCart => "view_cart".to_string(),
            CallbackAction::Checkout => "checkout".to_string(),
            CallbackAction::ConfirmOrder => "confirm_order".to_string(),
            CallbackAction::CancelOrder => "cancel_order".to_string(),
            CallbackAction::MainMenu => "main_menu".to_string(),
            CallbackAction::Noop | CallbackAction::Unknown => "noop".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_id_carrying_actions() {
        assert_eq!(CallbackAction::parse("cat_3"), CallbackAction::Category(3));
        assert_eq!(CallbackAction::parse("prod_12"), CallbackAction::Product(12));
        assert_eq!(CallbackAction::parse("add_7"), CallbackAction::Add(7));
        assert_eq!(
            CallbackAction::parse("qty_plus_7"),
            CallbackAction::Quantity(7, QuantityChange::Plus)
        );
        assert_eq!(
            CallbackAction::parse("qty_minus_7"),
            CallbackAction::Quantity(7, QuantityChange::Minus)
        );
        assert_eq!(CallbackAction::parse("del_9"), CallbackAction::Delete(9));
    }

    #[test]
    fn parses_fixed_actions() {
        assert_eq!(CallbackAction::parse("checkout"), CallbackAction::Checkout);
        assert_eq!(CallbackAction::parse("view_cart"), CallbackAction::ViewCart);
        assert_eq!(CallbackAction::parse("confirm_order"), CallbackAction::ConfirmOrder);
        assert_eq!(CallbackAction::parse("cancel_order"), CallbackAction::CancelOrder);
        assert_eq!(CallbackAction::parse("main_menu"), CallbackAction::MainMenu);
        assert_eq!(CallbackAction::parse("noop"), CallbackAction::Noop);
    }

    #[test]
    fn malformed_or_unknown_data_is_unknown() {
        for data in ["", "cat_", "add_x", "add_-4", "prod_0", "qty_up_1", "del_1_2", "approve:5"] {
            let action = CallbackAction::parse(data);
            assert_eq!(action, CallbackAction::Unknown, "{:?}", data);
        }
    }

    #[test]
    fn data_round_trips_through_keyboard_encoding() {
        let actions = [
            CallbackAction::Category(1),
            CallbackAction::Quantity(5, QuantityChange::Minus),
            CallbackAction::Delete(8),
            CallbackAction::ConfirmOrder,
            CallbackAction::BackToCatalog,
        ];
        for action in actions {
            assert_eq!(CallbackAction::parse(&action.to_data()), action);
        }
    }

    #[test]
    fn classifies_messages() {
        assert_eq!(
            Inbound::classify(Some("/unknown"), None),
            Inbound::Command("/unknown".to_string())
        );
        assert_eq!(
            Inbound::classify(Some(BTN_CART), None),
            Inbound::Menu(MenuAction::Cart)
        );
        assert_eq!(
            Inbound::classify(Some("Chilonzor 5"), None),
            Inbound::FreeText("Chilonzor 5".to_string())
        );
        assert_eq!(
            Inbound::classify(None, Some("+998901234567")),
            Inbound::SharedPhone("+998901234567".to_string())
        );
        assert_eq!(Inbound::classify(None, None), Inbound::Unsupported);
    }

    #[test]
    fn unknown_commands_and_stickers_get_no_reply() {
        assert!(Inbound::classify(Some("/foo"), None).is_ignored());
        assert!(Inbound::classify(Some("/start@other_bot x"), None).is_ignored());
        assert!(Inbound::classify(None, None).is_ignored());

        assert!(!Inbound::classify(Some(BTN_HELP), None).is_ignored());
        assert!(!Inbound::classify(Some("salom"), None).is_ignored());
        assert!(!Inbound::classify(None, Some("+998901234567")).is_ignored());
    }
}
