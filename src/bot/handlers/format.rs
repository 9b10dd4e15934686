use crate::cart::{format_amount, Cart};
use crate::db::{Order, OrderItem, OrderStatus, OrderSummary, Product, ShopStats};
use chrono::{DateTime, Local, Utc};
use teloxide::utils::html;

pub fn format_date(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "—".to_string())
}

pub fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::New => "🆕 Yangi",
        OrderStatus::Processing => "🔄 Jarayonda",
        OrderStatus::Completed => "✅ Yakunlangan",
        OrderStatus::Cancelled => "❌ Bekor qilingan",
    }
}

pub fn welcome_text(first_name: Option<&str>, shop_name: &str) -> String {
    format!(
        "Assalomu alaykum, {}! 👋\n\n\
         {} do'koniga xush kelibsiz! 🛍\n\n\
         Quyidagi menyudan foydalaning:",
        first_name.unwrap_or("mehmon"),
        shop_name
    )
}

pub fn help_text(is_admin: bool) -> String {
    let mut text = String::from(
        "ℹ️ Yordam\n\n\
         🛍 Katalog - mahsulotlarni ko'rish\n\
         🛒 Savatcha - savatni ko'rish va buyurtma berish\n\
         📦 Buyurtmalarim - oxirgi buyurtmalar\n\n\
         /cart - savatcha\n\
         /myorders - buyurtmalarim\n\
         /cancel - buyurtma rasmiylashtirishni bekor qilish\n\n\
         Savol bo'lsa, shu yerga yozing, operator javob beradi.",
    );
    if is_admin {
        text.push_str(
            "\n\nAdmin buyruqlari:\n\
             /orders [new|processing|completed|cancelled] - buyurtmalar\n\
             /order <id> - buyurtma tafsilotlari\n\
             /setstatus <id> <holat> - buyurtma holatini o'zgartirish\n\
             /reply <telegram_id> <matn> - mijozga javob\n\
             /addcategory <nomi> - kategoriya qo'shish\n\
             /addproduct <kategoriya_id> <narx> <qoldiq> <nomi> - mahsulot qo'shish\n\
             /stats - statistika",
        );
    }
    text
}

/// HTML cart body: one line per item with its subtotal, then the total.
pub fn render_cart(cart: &Cart, currency: &str) -> String {
    if cart.is_empty() {
        return "🛒 Savatingiz bo'sh.\n\nMahsulot qo'shish uchun katalogni oching.".to_string();
    }
    let mut text = String::from("🛒 <b>Savatcha</b>\n\n");
    for (index, line) in cart.lines().iter().enumerate() {
        text.push_str(&format!(
            "{}. <b>{}</b>\n   {} x {} = {}\n",
            index + 1,
            html::escape(&line.product.name),
            line.quantity,
            format_amount(line.product.price, currency),
            format_amount(line.subtotal(), currency),
        ));
    }
    text.push_str(&format!(
        "\n💵 <b>Jami: {}</b>",
        format_amount(cart.total(), currency)
    ));
    text
}

pub fn render_checkout_summary(cart: &Cart, phone: &str, address: &str, currency: &str) -> String {
    let mut text = String::from("📋 <b>Buyurtmangizni tasdiqlang</b>\n\n");
    for line in cart.lines() {
        text.push_str(&format!(
            "• {} x {} = {}\n",
            html::escape(&line.product.name),
            line.quantity,
            format_amount(line.subtotal(), currency),
        ));
    }
    text.push_str(&format!(
        "\n💵 Jami: <b>{}</b>\n📞 Telefon: {}\n📍 Manzil: {}\n💳 To'lov: karta orqali",
        format_amount(cart.total(), currency),
        html::escape(phone),
        html::escape(address),
    ));
    text
}

pub fn render_product(product: &Product, currency: &str) -> String {
    let mut text = format!(
        "<b>{}</b>\n\n💵 Narxi: {}",
        html::escape(&product.name),
        format_amount(product.price, currency)
    );
    if let Some(description) = product.description.as_deref().filter(|d| !d.trim().is_empty()) {
        text.push_str(&format!("\n\n{}", html::escape(description)));
    }
    if product.stock <= 0 {
        text.push_str("\n\n⚠️ Hozircha mavjud emas");
    }
    text
}

pub fn render_my_orders(orders: &[OrderSummary], currency: &str) -> String {
    if orders.is_empty() {
        return "📦 Sizda hali buyurtmalar yo'q.".to_string();
    }
    let mut text = String::from("📦 Oxirgi buyurtmalaringiz:\n");
    for order in orders {
        text.push_str(&format!(
            "\n#{} | {} | {} | {}",
            order.id,
            format_date(order.created_at),
            format_amount(order.total_amount, currency),
            status_label(order.status),
        ));
    }
    text
}

pub fn render_admin_order_line(order: &OrderSummary, currency: &str) -> String {
    format!(
        "#{} {} | {} (id {}) | {} | {} | {}",
        order.id,
        status_label(order.status),
        order.customer_profile().display_name(),
        order.telegram_id,
        order.phone_number,
        format_amount(order.total_amount, currency),
        format_date(order.created_at),
    )
}

pub fn render_order_detail(order: &Order, items: &[OrderItem], currency: &str) -> String {
    let mut text = format!(
        "📋 Buyurtma #{}\n\
         Holati: {}\n\
         Sana: {}\n\
         📞 {}\n\
         📍 {}\n\
         💳 {} ({})\n\n",
        order.id,
        status_label(order.status),
        format_date(order.created_at),
        order.phone_number,
        order.delivery_address.as_deref().unwrap_or("—"),
        order.payment_method,
        order.payment_status,
    );
    for item in items {
        text.push_str(&format!(
            "• {} x {} = {}\n",
            item.product_name,
            item.quantity,
            format_amount(item.price * item.quantity, currency),
        ));
    }
    text.push_str(&format!("\nJami: {}", format_amount(order.total_amount, currency)));
    text
}

pub fn render_stats(stats: &ShopStats, currency: &str) -> String {
    format!(
        "📊 Statistika\n\n\
         Mijozlar: {}\n\
         Faol mahsulotlar: {}\n\
         Buyurtmalar: {} (yangi: {})\n\
         Buyurtma qatorlari: {}\n\
         Xabarlar: {}\n\
         Tushum: {}",
        stats.customers,
        stats.products,
        stats.orders,
        stats.new_orders,
        stats.order_items,
        stats.messages,
        format_amount(stats.revenue, currency),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::ProductSnapshot;

    fn cart() -> Cart {
        let mut cart = Cart::default();
        cart.add_item(ProductSnapshot {
            id: 1,
            name: "Apple <box>".to_string(),
            price: 10_000,
        });
        for _ in 0..2 {
            cart.add_item(ProductSnapshot {
                id: 2,
                name: "Pear".to_string(),
                price: 5_000,
            });
        }
        cart
    }

    #[test]
    fn empty_cart_renders_dedicated_message() {
        let text = render_cart(&Cart::default(), "so'm");
        assert!(text.contains("bo'sh"));
        assert!(!text.contains("Jami"));
    }

    #[test]
    fn cart_shows_lines_subtotals_and_total() {
        let text = render_cart(&cart(), "so'm");
        assert!(text.contains("Apple &lt;box&gt;"));
        assert!(text.contains("2 x 5 000 so'm = 10 000 so'm"));
        assert!(text.contains("Jami: 20 000 so'm"));
        assert!(text.find("Apple").unwrap() < text.find("Pear").unwrap());
    }

    #[test]
    fn summary_lists_contact_details() {
        let text = render_checkout_summary(&cart(), "+998901234567", "Chilonzor & Co", "so'm");
        assert!(text.contains("+998901234567"));
        assert!(text.contains("Chilonzor &amp; Co"));
        assert!(text.contains("20 000 so'm"));
    }

    #[test]
    fn sold_out_product_is_marked() {
        let product = Product {
            id: 1,
            name: "Tea".to_string(),
            description: Some("Green".to_string()),
            price: 12_500,
            category_id: None,
            images: "[]".to_string(),
            stock: 0,
        };
        let text = render_product(&product, "so'm");
        assert!(text.contains("12 500 so'm"));
        assert!(text.contains("Green"));
        assert!(text.contains("mavjud emas"));
    }

    #[test]
    fn order_detail_lists_items_and_total() {
        let order = Order {
            id: 7,
            customer_id: 1,
            status: OrderStatus::Processing,
            payment_method: "card".to_string(),
            payment_status: "pending".to_string(),
            delivery_method: "delivery".to_string(),
            delivery_address: None,
            total_amount: 25_000,
            phone_number: "+998901234567".to_string(),
            created_at: 0,
        };
        let items = vec![OrderItem {
            id: 1,
            order_id: 7,
            product_id: 3,
            quantity: 2,
            price: 12_500,
            product_name: "Tea".to_string(),
        }];
        let text = render_order_detail(&order, &items, "so'm");
        assert!(text.contains("Buyurtma #7"));
        assert!(text.contains("Tea x 2 = 25 000 so'm"));
        assert!(text.contains("Jami: 25 000 so'm"));
        assert!(text.contains("📍 —"));
    }

    #[test]
    fn admin_help_is_extended() {
        assert!(!help_text(false).contains("/setstatus"));
        assert!(help_text(true).contains("/setstatus"));
    }
}
