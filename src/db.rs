//! SQLite layer for the catalog, customers, orders and customer chat messages.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{FromRow, SqliteConnection};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub category_id: Option<i64>,
    /// JSON array of image references (URLs or local paths).
    pub images: String,
    pub stock: i64,
}

impl Product {
    pub fn first_image(&self) -> Option<String> {
        serde_json::from_str::<Vec<String>>(&self.images)
            .ok()?
            .into_iter()
            .map(|image| image.trim().to_string())
            .find(|image| !image.is_empty())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Customer {
    pub id: i64,
    pub telegram_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: i64,
}

/// Telegram profile fields copied onto a new customer row.
#[derive(Debug, Clone, Default)]
pub struct CustomerProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl CustomerProfile {
    /// `@username`, else the full name, else a placeholder.
    pub fn display_name(&self) -> String {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return format!("@{}", username);
        }
        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full_name.is_empty() {
            "—".to_string()
        } else {
            full_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::New,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("unknown order status: {}", s))
    }
}

pub const PAYMENT_METHOD_CARD: &str = "card";
pub const PAYMENT_STATUS_PENDING: &str = "pending";
pub const DELIVERY_METHOD_DELIVERY: &str = "delivery";

#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub status: OrderStatus,
    pub payment_method: String,
    pub payment_status: String,
    pub delivery_method: String,
    pub delivery_address: Option<String>,
    pub total_amount: i64,
    pub phone_number: String,
    pub created_at: i64,
}

/// Order joined with the customer it belongs to.
#[derive(Debug, Clone, FromRow)]
pub struct OrderSummary {
    pub id: i64,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub phone_number: String,
    pub delivery_address: Option<String>,
    pub created_at: i64,
    pub telegram_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl OrderSummary {
    pub fn customer_profile(&self) -> CustomerProfile {
        CustomerProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub price: i64,
    pub product_name: String,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub price: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub telegram_id: i64,
    pub customer: CustomerProfile,
    pub phone_number: String,
    pub delivery_address: String,
    pub payment_method: &'static str,
    pub delivery_method: &'static str,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn total_amount(&self) -> i64 {
        self.items
            .iter()
            .map(|item| item.price.saturating_mul(i64::from(item.quantity)))
            .fold(0, i64::saturating_add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: i64,
    pub customer_id: i64,
    pub total_amount: i64,
    pub item_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSender {
    Customer,
    Admin,
}

impl MessageSender {
    fn as_str(self) -> &'static str {
        match self {
            MessageSender::Customer => "customer",
            MessageSender::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i64,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopStats {
    pub customers: i64,
    pub products: i64,
    pub orders: i64,
    pub new_orders: i64,
    pub order_items: i64,
    pub messages: i64,
    pub revenue: i64,
}

pub struct Db {
    pool: SqlitePool,
}

fn current_unix_timestamp() -> Result<i64, anyhow::Error> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .map_err(|err| anyhow::anyhow!("System clock is before UNIX_EPOCH: {}", err))
}

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, category_id, images, stock";
const ORDER_SUMMARY_SELECT: &str = "SELECT o.id, o.status, o.total_amount, o.phone_number, o.delivery_address, o.created_at,
            c.telegram_id, c.first_name, c.last_name, c.username
     FROM orders o
     JOIN customers c ON c.id = o.customer_id";

impl Db {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create database directory: {}", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to SQLite: {}", e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, anyhow::Error> {
        use sqlx::sqlite::SqlitePoolOptions;

        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // every connection would get its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                price INTEGER NOT NULL,
                category_id INTEGER REFERENCES categories(id),
                images TEXT NOT NULL DEFAULT '[]',
                stock INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Catalog migration: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER NOT NULL UNIQUE,
                first_name TEXT,
                last_name TEXT,
                username TEXT,
                phone_number TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                status TEXT NOT NULL DEFAULT 'new',
                payment_method TEXT NOT NULL,
                payment_status TEXT NOT NULL DEFAULT 'pending',
                delivery_method TEXT NOT NULL,
                delivery_address TEXT,
                total_amount INTEGER NOT NULL,
                phone_number TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id);
            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL REFERENCES orders(id),
                product_id INTEGER NOT NULL REFERENCES products(id),
                quantity INTEGER NOT NULL,
                price INTEGER NOT NULL,
                product_name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                sender TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_customer ON messages(customer_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Orders migration: {}", e))?;

        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, anyhow::Error> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, sort_order FROM categories
             WHERE is_active = 1
             ORDER BY sort_order ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_category(&self, id: i64) -> Result<Option<Category>, anyhow::Error> {
        let row = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, sort_order FROM categories WHERE id = ? AND is_active = 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_products_by_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<Product>, anyhow::Error> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE category_id = ? AND is_active = 1 ORDER BY id DESC",
            PRODUCT_COLUMNS
        ))
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_product(&self, id: i64) -> Result<Option<Product>, anyhow::Error> {
        let row = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = ? AND is_active = 1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, anyhow::Error> {
        let id = sqlx::query(
            "INSERT INTO categories (name, description, sort_order)
             VALUES (?, ?, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM categories))",
        )
        .bind(name)
        .bind(description)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<i64, anyhow::Error> {
        let images = serde_json::to_string(&product.images)?;
        let id = sqlx::query(
            "INSERT INTO products (name, description, price, category_id, images, stock)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.category_id)
        .bind(images)
        .bind(product.stock)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Inserts the customer if this Telegram user was never seen. An existing row
    /// only gets its phone filled when it had none.
    async fn upsert_customer(
        conn: &mut SqliteConnection,
        telegram_id: i64,
        profile: &CustomerProfile,
        phone_number: Option<&str>,
    ) -> Result<Customer, anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query(
            "INSERT INTO customers (telegram_id, first_name, last_name, username, phone_number, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(telegram_id) DO UPDATE
             SET phone_number = COALESCE(customers.phone_number, excluded.phone_number)",
        )
        .bind(telegram_id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.username)
        .bind(phone_number)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, telegram_id, first_name, last_name, username, phone_number, created_at
             FROM customers WHERE telegram_id = ?",
        )
        .bind(telegram_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(customer)
    }

    pub async fn get_or_create_customer(
        &self,
        telegram_id: i64,
        profile: &CustomerProfile,
    ) -> Result<Customer, anyhow::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_customer(&mut conn, telegram_id, profile, None).await
    }

    pub async fn get_customer_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<Customer>, anyhow::Error> {
        let row = sqlx::query_as::<_, Customer>(
            "SELECT id, telegram_id, first_name, last_name, username, phone_number, created_at
             FROM customers WHERE telegram_id = ?",
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Creates the customer (if needed), the order and all its items in one
    /// transaction: either everything is stored or nothing is.
    pub async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder, anyhow::Error> {
        if order.items.is_empty() {
            return Err(anyhow::anyhow!("order has no items"));
        }
        let now = current_unix_timestamp()?;
        let total_amount = order.total_amount();

        let mut tx = self.pool.begin().await?;
        let customer = Self::upsert_customer(
            &mut tx,
            order.telegram_id,
            &order.customer,
            Some(&order.phone_number),
        )
        .await?;

        let order_id = sqlx::query(
            "INSERT INTO orders (customer_id, status, payment_method, payment_status, delivery_method,
                                 delivery_address, total_amount, phone_number, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(customer.id)
        .bind(OrderStatus::New)
        .bind(order.payment_method)
        .bind(PAYMENT_STATUS_PENDING)
        .bind(order.delivery_method)
        .bind(&order.delivery_address)
        .bind(total_amount)
        .bind(&order.phone_number)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, price, product_name)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(item.product_id)
            .bind(i64::from(item.quantity))
            .bind(item.price)
            .bind(&item.product_name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(PlacedOrder {
            order_id,
            customer_id: customer.id,
            total_amount,
            item_count: order.items.len(),
        })
    }

    pub async fn create_message(
        &self,
        customer_id: i64,
        sender: MessageSender,
        text: &str,
    ) -> Result<i64, anyhow::Error> {
        let now = current_unix_timestamp()?;
        let id = sqlx::query(
            "INSERT INTO messages (customer_id, sender, text, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(customer_id)
        .bind(sender.as_str())
        .bind(text)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn list_orders_by_telegram_id(
        &self,
        telegram_id: i64,
        limit: i64,
    ) -> Result<Vec<OrderSummary>, anyhow::Error> {
        let rows = sqlx::query_as::<_, OrderSummary>(&format!(
            "{} WHERE c.telegram_id = ? ORDER BY o.created_at DESC, o.id DESC LIMIT ?",
            ORDER_SUMMARY_SELECT
        ))
        .bind(telegram_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_recent_orders(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<OrderSummary>, anyhow::Error> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, OrderSummary>(&format!(
                    "{} WHERE o.status = ? ORDER BY o.created_at DESC, o.id DESC LIMIT ?",
                    ORDER_SUMMARY_SELECT
                ))
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, OrderSummary>(&format!(
                    "{} ORDER BY o.created_at DESC, o.id DESC LIMIT ?",
                    ORDER_SUMMARY_SELECT
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn get_order(&self, id: i64) -> Result<Option<Order>, anyhow::Error> {
        let row = sqlx::query_as::<_, Order>(
            "SELECT id, customer_id, status, payment_method, payment_status, delivery_method,
                    delivery_address, total_amount, phone_number, created_at
             FROM orders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, anyhow::Error> {
        let rows = sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, quantity, price, product_name
             FROM order_items WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Returns the updated order together with its customer, `None` if no such order.
    pub async fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<Option<OrderSummary>, anyhow::Error> {
        let updated = sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, OrderSummary>(&format!(
            "{} WHERE o.id = ?",
            ORDER_SUMMARY_SELECT
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn stats(&self) -> Result<ShopStats, anyhow::Error> {
        let count = |sql: &'static str| sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool);

        let customers = count("SELECT COUNT(*) FROM customers").await?;
        let products = count("SELECT COUNT(*) FROM products WHERE is_active = 1").await?;
        let orders = count("SELECT COUNT(*) FROM orders").await?;
        let order_items = count("SELECT COUNT(*) FROM order_items").await?;
        let messages = count("SELECT COUNT(*) FROM messages").await?;
        let new_orders = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE status = ?")
            .bind(OrderStatus::New)
            .fetch_one(&self.pool)
            .await?;
        let revenue = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE status != ?",
        )
        .bind(OrderStatus::Cancelled)
        .fetch_one(&self.pool)
        .await?;

        Ok(ShopStats {
            customers,
            products,
            orders,
            new_orders,
            order_items,
            messages,
            revenue,
        })
    }
}
