//! Best-effort notifications about placed orders and customer messages.

use crate::cart::format_amount;
use crate::db::CustomerProfile;
use std::future::Future;
use teloxide::prelude::*;

/// Outbound text transport.
pub trait Messenger: Send + Sync {
    fn send_text(
        &self,
        chat_id: i64,
        text: String,
    ) -> impl Future<Output = Result<(), anyhow::Error>> + Send;
}

impl Messenger for Bot {
    async fn send_text(&self, chat_id: i64, text: String) -> Result<(), anyhow::Error> {
        self.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdminContacts {
    pub chat_id: Option<i64>,
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    pub customer: Delivery,
    pub admin_chat: Delivery,
    pub admin_group: Delivery,
}

#[derive(Debug, Clone)]
pub struct OrderNotice {
    pub order_id: i64,
    pub customer_chat_id: i64,
    pub customer: CustomerProfile,
    pub total_amount: i64,
    pub phone_number: String,
    pub delivery_address: String,
    pub payment_method: String,
    pub currency: String,
}

impl OrderNotice {
    fn customer_text(&self) -> String {
        format!(
            "✅ Buyurtma qabul qilindi!\n\n\
             📋 Buyurtma raqami: #{}\n\
             💵 Summa: {}\n\
             📍 Manzil: {}\n\
             📞 Telefon: {}\n\n\
             Tez orada operator siz bilan bog'lanadi.\n\n\
             Rahmat! 🎉",
            self.order_id,
            format_amount(self.total_amount, &self.currency),
            self.delivery_address,
            self.phone_number,
        )
    }

    fn admin_chat_text(&self) -> String {
        format!(
            "📦 Yangi buyurtma #{}\n\
             👤 {} (id {})\n\
             💵 Umumiy: {}\n\
             📞 Telefon: {}\n\
             📍 Manzil: {}\n\
             💳 To'lov: {}",
            self.order_id,
            self.customer.display_name(),
            self.customer_chat_id,
            format_amount(self.total_amount, &self.currency),
            self.phone_number,
            self.delivery_address,
            self.payment_method,
        )
    }

    fn admin_group_text(&self) -> String {
        format!(
            "📦 Yangi buyurtma #{}\n👤 {}",
            self.order_id,
            self.customer.display_name()
        )
    }
}

async fn deliver<M: Messenger>(
    messenger: &M,
    chat_id: Option<i64>,
    text: String,
    recipient: &'static str,
) -> Delivery {
    let Some(chat_id) = chat_id else {
        return Delivery::Skipped;
    };
    match messenger.send_text(chat_id, text).await {
        Ok(()) => Delivery::Sent,
        Err(error) => {
            tracing::warn!(
                recipient = recipient,
                chat_id = chat_id,
                error = %error,
                "Failed to deliver notification"
            );
            Delivery::Failed
        }
    }
}

/// Notifies the customer, the admin chat and the admin group. The three sends
/// are independent: a failure is logged and never reaches the caller.
pub async fn fan_out_order<M: Messenger>(
    messenger: &M,
    admins: AdminContacts,
    notice: &OrderNotice,
) -> FanOutReport {
    let (customer, admin_chat, admin_group) = tokio::join!(
        deliver(
            messenger,
            Some(notice.customer_chat_id),
            notice.customer_text(),
            "customer"
        ),
        deliver(messenger, admins.chat_id, notice.admin_chat_text(), "admin_chat"),
        deliver(
            messenger,
            admins.group_id,
            notice.admin_group_text(),
            "admin_group"
        ),
    );

    let report = FanOutReport {
        customer,
        admin_chat,
        admin_group,
    };
    tracing::info!(order_id = notice.order_id, report = ?report, "Order notifications done");
    report
}

/// Forwards an inbound customer message to the admin chat, if one is configured.
pub async fn forward_customer_message<M: Messenger>(
    messenger: &M,
    admins: AdminContacts,
    telegram_id: i64,
    customer: &CustomerProfile,
    phone_number: Option<&str>,
    text: &str,
) -> Delivery {
    let forwarded = format!(
        "💬 Yangi xabar\nMijoz: {} (id {})\nTelefon: {}\n\n{}",
        customer.display_name(),
        telegram_id,
        phone_number.unwrap_or("—"),
        text
    );
    deliver(messenger, admins.chat_id, forwarded, "admin_chat").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(i64, String)>>,
        failing: HashSet<i64>,
    }

    impl Messenger for RecordingMessenger {
        async fn send_text(&self, chat_id: i64, text: String) -> Result<(), anyhow::Error> {
            if self.failing.contains(&chat_id) {
                return Err(anyhow::anyhow!("chat {} is unreachable", chat_id));
            }
            self.sent.lock().unwrap().push((chat_id, text));
            Ok(())
        }
    }

    impl RecordingMessenger {
        fn recipients(&self) -> Vec<i64> {
            let mut ids: Vec<i64> = self.sent.lock().unwrap().iter().map(|(id, _)| *id).collect();
            ids.sort_unstable();
            ids
        }
    }

    fn notice() -> OrderNotice {
        OrderNotice {
            order_id: 15,
            customer_chat_id: 1000,
            customer: CustomerProfile {
                first_name: Some("Dilnoza".to_string()),
                last_name: None,
                username: None,
            },
            total_amount: 20_000,
            phone_number: "+998901234567".to_string(),
            delivery_address: "Tashkent, street 1".to_string(),
            payment_method: "card".to_string(),
            currency: "so'm".to_string(),
        }
    }

    #[tokio::test]
    async fn sends_to_all_three_recipients() {
        let messenger = RecordingMessenger::default();
        let admins = AdminContacts {
            chat_id: Some(1),
            group_id: Some(-100),
        };

        let report = fan_out_order(&messenger, admins, &notice()).await;
        assert_eq!(
            report,
            FanOutReport {
                customer: Delivery::Sent,
                admin_chat: Delivery::Sent,
                admin_group: Delivery::Sent,
            }
        );
        assert_eq!(messenger.recipients(), vec![-100, 1, 1000]);

        let sent = messenger.sent.lock().unwrap();
        let to_customer = &sent.iter().find(|(id, _)| *id == 1000).unwrap().1;
        assert!(to_customer.contains("#15"));
        assert!(to_customer.contains("20 000 so'm"));
        let to_group = &sent.iter().find(|(id, _)| *id == -100).unwrap().1;
        assert!(to_group.contains("Dilnoza"));
        assert!(!to_group.contains("+998901234567"));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        let messenger = RecordingMessenger {
            failing: HashSet::from([1]),
            ..Default::default()
        };
        let admins = AdminContacts {
            chat_id: Some(1),
            group_id: Some(-100),
        };

        let report = fan_out_order(&messenger, admins, &notice()).await;
        assert_eq!(report.admin_chat, Delivery::Failed);
        assert_eq!(report.customer, Delivery::Sent);
        assert_eq!(report.admin_group, Delivery::Sent);
        assert_eq!(messenger.recipients(), vec![-100, 1000]);
    }

    #[tokio::test]
    async fn missing_admin_contacts_are_skipped() {
        let messenger = RecordingMessenger::default();
        let report = fan_out_order(&messenger, AdminContacts::default(), &notice()).await;
        assert_eq!(report.customer, Delivery::Sent);
        assert_eq!(report.admin_chat, Delivery::Skipped);
        assert_eq!(report.admin_group, Delivery::Skipped);
        assert_eq!(messenger.recipients(), vec![1000]);
    }

    #[tokio::test]
    async fn customer_message_goes_to_admin_chat_only() {
        let messenger = RecordingMessenger::default();
        let admins = AdminContacts {
            chat_id: Some(7),
            group_id: Some(-100),
        };
        let delivery = forward_customer_message(
            &messenger,
            admins,
            55,
            &CustomerProfile::default(),
            None,
            "Do you deliver on Sunday?",
        )
        .await;
        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(messenger.recipients(), vec![7]);

        let skipped = forward_customer_message(
            &RecordingMessenger::default(),
            AdminContacts::default(),
            55,
            &CustomerProfile::default(),
            None,
            "hi",
        )
        .await;
        assert_eq!(skipped, Delivery::Skipped);
    }
}
