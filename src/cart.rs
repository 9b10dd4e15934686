//! In-memory cart kept inside a user's session.

use crate::db::Product;

/// Product data captured when it was added; later catalog edits don't touch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub id: i64,
    pub name: String,
    pub price: i64,
}

impl From<&Product> for ProductSnapshot {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product: ProductSnapshot,
    /// Always >= 1 while the line is present.
    pub quantity: u32,
}

impl CartLine {
    pub fn subtotal(&self) -> i64 {
        self.product.price.saturating_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    Plus,
    Minus,
}

/// Cart lines in insertion order, at most one line per product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Increments an existing line or inserts a new one; returns the new quantity.
    pub fn add_item(&mut self, product: ProductSnapshot) -> u32 {
        if let Some(line) = self.line_mut(product.id) {
            line.quantity += 1;
            return line.quantity;
        }
        self.lines.push(CartLine {
            product,
            quantity: 1,
        });
        1
    }

    /// Returns the remaining quantity, `None` if the line is gone or never existed.
    pub fn change_quantity(&mut self, product_id: i64, change: QuantityChange) -> Option<u32> {
        let line = self.line_mut(product_id)?;
        match change {
            QuantityChange::Plus => {
                line.quantity += 1;
                Some(line.quantity)
            }
            QuantityChange::Minus if line.quantity > 1 => {
                line.quantity -= 1;
                Some(line.quantity)
            }
            QuantityChange::Minus => {
                self.remove_item(product_id);
                None
            }
        }
    }

    pub fn remove_item(&mut self, product_id: i64) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.product.id != product_id);
        self.lines.len() != before
    }

    pub fn total(&self) -> i64 {
        self.lines
            .iter()
            .map(CartLine::subtotal)
            .fold(0, i64::saturating_add)
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn quantity_of(&self, product_id: i64) -> Option<u32> {
        self.lines
            .iter()
            .find(|line| line.product.id == product_id)
            .map(|line| line.quantity)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn line_mut(&mut self, product_id: i64) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| line.product.id == product_id)
    }
}

/// `1234567` -> `1 234 567 so'm`.
pub fn format_amount(amount: i64, currency: &str) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{}{} {}", sign, grouped, currency)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, price: i64) -> ProductSnapshot {
        ProductSnapshot {
            id,
            name: format!("Product {}", id),
            price,
        }
    }

    #[test]
    fn adding_same_product_twice_increments_one_line() {
        let mut cart = Cart::default();
        assert_eq!(cart.add_item(product(7, 100)), 1);
        assert_eq!(cart.add_item(product(7, 100)), 2);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(7), Some(2));
    }

    #[test]
    fn minus_on_single_unit_removes_line() {
        let mut cart = Cart::default();
        cart.add_item(product(1, 500));
        assert_eq!(cart.change_quantity(1, QuantityChange::Minus), None);
        assert!(cart.quantity_of(1).is_none());
        assert!(cart.is_empty());
    }

    #[test]
    fn change_quantity_on_missing_line_is_noop() {
        let mut cart = Cart::default();
        cart.add_item(product(1, 500));
        assert_eq!(cart.change_quantity(2, QuantityChange::Plus), None);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(1), Some(1));
    }

    #[test]
    fn plus_and_minus_adjust_quantity() {
        let mut cart = Cart::default();
        cart.add_item(product(3, 10));
        assert_eq!(cart.change_quantity(3, QuantityChange::Plus), Some(2));
        assert_eq!(cart.change_quantity(3, QuantityChange::Plus), Some(3));
        assert_eq!(cart.change_quantity(3, QuantityChange::Minus), Some(2));
        assert_eq!(cart.total(), 20);
    }

    #[test]
    fn remove_item_is_unconditional() {
        let mut cart = Cart::default();
        cart.add_item(product(1, 10));
        cart.add_item(product(1, 10));
        assert!(cart.remove_item(1));
        assert!(!cart.remove_item(1));
        assert!(cart.is_empty());
    }

    #[test]
    fn total_tracks_adds_and_removals() {
        let mut cart = Cart::default();
        assert_eq!(cart.total(), 0);

        cart.add_item(product(1, 10_000));
        cart.add_item(product(2, 5_000));
        cart.add_item(product(2, 5_000));
        cart.add_item(product(3, 1_250));
        assert_eq!(cart.total(), 10_000 + 5_000 * 2 + 1_250);

        cart.remove_item(3);
        cart.change_quantity(1, QuantityChange::Minus);
        assert_eq!(cart.total(), 10_000);

        let by_lines: i64 = cart
            .lines()
            .iter()
            .map(|line| line.product.price * i64::from(line.quantity))
            .sum();
        assert_eq!(cart.total(), by_lines);
    }

    #[test]
    fn snapshot_price_is_kept_after_catalog_change() {
        let mut cart = Cart::default();
        cart.add_item(product(1, 100));
        // second add carries a newer price; the stored snapshot wins
        cart.add_item(product(1, 999));
        assert_eq!(cart.total(), 200);
    }

    #[test]
    fn amounts_are_grouped_by_thousands() {
        assert_eq!(format_amount(0, "so'm"), "0 so'm");
        assert_eq!(format_amount(999, "so'm"), "999 so'm");
        assert_eq!(format_amount(20_000, "so'm"), "20 000 so'm");
        assert_eq!(format_amount(1_234_567, "UZS"), "1 234 567 UZS");
        assert_eq!(format_amount(-5_000, "so'm"), "-5 000 so'm");
    }

    #[test]
    fn lines_keep_insertion_order() {
        let mut cart = Cart::default();
        cart.add_item(product(9, 1));
        cart.add_item(product(2, 1));
        cart.add_item(product(5, 1));
        let ids: Vec<i64> = cart.lines().iter().map(|line| line.product.id).collect();
        assert_eq!(ids, vec![9, 2, 5]);
    }

    #[test]
    fn huge_prices_saturate_instead_of_overflowing() {
        let mut cart = Cart::default();
        cart.add_item(product(1, i64::MAX / 2));
        cart.add_item(product(1, i64::MAX / 2));
        cart.add_item(product(1, i64::MAX / 2));
        assert_eq!(cart.lines()[0].subtotal(), i64::MAX);
        cart.add_item(product(2, 10));
        assert_eq!(cart.total(), i64::MAX);
    }
}
