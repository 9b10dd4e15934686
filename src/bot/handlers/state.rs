use crate::config::Config;
use crate::db::{CustomerProfile, Db};
use crate::notify::AdminContacts;
use crate::session::SessionManager;
use std::sync::Arc;
use teloxide::types::{Message, User};

#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub db: Arc<Db>,
    pub sessions: Arc<SessionManager>,
    pub bot_username: Option<String>,
}

impl BotState {
    pub fn admin_contacts(&self) -> AdminContacts {
        AdminContacts {
            chat_id: self.config.admin_chat_id,
            group_id: self.config.admin_group_id,
        }
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }
}

pub fn sender_user_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}

pub fn user_profile(user: &User) -> CustomerProfile {
    let non_empty = |value: &str| {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    };
    CustomerProfile {
        first_name: non_empty(&user.first_name),
        last_name: user.last_name.as_deref().and_then(non_empty),
        username: user.username.as_deref().and_then(non_empty),
    }
}

pub fn sender_profile(msg: &Message) -> CustomerProfile {
    msg.from.as_ref().map(user_profile).unwrap_or_default()
}

pub fn is_admin_message(msg: &Message, state: &BotState) -> bool {
    sender_user_id(msg).is_some_and(|user_id| state.config.is_admin(user_id))
}
