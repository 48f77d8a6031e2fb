//! Cart Ledger: the buyer's intent to purchase, held on the client.
//!
//! Lines are addressed by [`LineKey`]. Every mutation is persisted to the
//! local store before it becomes visible, and then published on a watch
//! channel so cart-count displays stay in sync.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{CartError, LocalStateError};
use crate::local::{CART_KEY, LocalStore};
use crate::records::Product;
use crate::value_objects::{LineKey, Money, ProductId};

/// Current version of the stored cart schema.
pub const CART_SCHEMA_VERSION: u32 = 1;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// A line in the cart, with display fields denormalized from the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    #[serde(default)]
    pub image: Option<String>,
    /// Stock observed when the line was added. Display only.
    #[serde(default)]
    pub stock: i64,
    pub size: String,
    pub color: String,
    pub quantity: u32,
}

impl CartLine {
    /// Returns the composite key of this line.
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id.clone(), &self.size, &self.color)
    }

    /// Returns unit price times quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.size == key.size && self.color == key.color
    }
}

/// Aggregate view published on every cart change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub line_count: usize,
    pub item_count: u64,
    pub total: Money,
}

impl CartSummary {
    fn of(lines: &[CartLine]) -> Self {
        Self {
            line_count: lines.len(),
            item_count: count_items(lines),
            total: lines.iter().map(CartLine::line_total).sum(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCart {
    version: u32,
    lines: Vec<CartLine>,
}

/// Line shape written before the schema was versioned.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyLine {
    id: String,
    #[serde(default)]
    nome: String,
    #[serde(default)]
    preco: f64,
    #[serde(default)]
    imagens: Vec<String>,
    #[serde(default)]
    estoque: i64,
    #[serde(default)]
    selected_size: String,
    #[serde(default)]
    selected_color: String,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl From<LegacyLine> for CartLine {
    fn from(legacy: LegacyLine) -> Self {
        Self {
            product_id: ProductId::new(legacy.id),
            name: legacy.nome,
            unit_price: Money::from_cents((legacy.preco * 100.0).round() as i64),
            image: legacy.imagens.into_iter().next(),
            stock: legacy.estoque,
            size: legacy.selected_size,
            color: legacy.selected_color,
            quantity: legacy.quantity.clamp(1, MAX_LINE_QUANTITY),
        }
    }
}

fn count_items(lines: &[CartLine]) -> u64 {
    lines.iter().map(|l| u64::from(l.quantity)).sum()
}

/// Decodes a stored cart, migrating the legacy bare-array format.
///
/// Returns the lines and whether a migration happened.
fn decode_cart(raw: &str) -> Result<(Vec<CartLine>, bool), LocalStateError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;

    if value.is_array() {
        let legacy: Vec<LegacyLine> = serde_json::from_value(value)?;
        return Ok((legacy.into_iter().map(CartLine::from).collect(), true));
    }

    let found = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    if found > u64::from(CART_SCHEMA_VERSION) {
        return Err(LocalStateError::UnsupportedVersion {
            key: CART_KEY.to_string(),
            found: u32::try_from(found).unwrap_or(u32::MAX),
            supported: CART_SCHEMA_VERSION,
        });
    }

    let stored: StoredCart = serde_json::from_value(value)?;
    Ok((stored.lines, false))
}

fn encode_cart(lines: &[CartLine]) -> Result<String, LocalStateError> {
    let stored = StoredCart {
        version: CART_SCHEMA_VERSION,
        lines: lines.to_vec(),
    };
    Ok(serde_json::to_string(&stored)?)
}

/// The Cart Ledger.
///
/// Sole source of truth for what the buyer intends to buy. Quantities are
/// always at least 1.
pub struct CartLedger<L: LocalStore> {
    store: L,
    lines: Vec<CartLine>,
    notifier: watch::Sender<CartSummary>,
}

impl<L: LocalStore> std::fmt::Debug for CartLedger<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartLedger")
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

impl<L: LocalStore> CartLedger<L> {
    /// Loads the cart persisted in `store`, or starts empty.
    pub fn load(store: L) -> Result<Self, CartError> {
        let lines = match store.get(CART_KEY)? {
            Some(raw) => {
                let (lines, migrated) = decode_cart(&raw)?;
                if migrated {
                    info!(lines = lines.len(), "Migrated legacy cart to current schema");
                    store.set(CART_KEY, &encode_cart(&lines)?)?;
                }
                lines
            }
            None => Vec::new(),
        };

        let (notifier, _) = watch::channel(CartSummary::of(&lines));
        Ok(Self {
            store,
            lines,
            notifier,
        })
    }

    /// Adds `quantity` units of a product configuration.
    ///
    /// A line with the same key is incremented; otherwise a new line is
    /// appended with display fields copied from `product`.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        product: &Product,
        size: &str,
        color: &str,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let key = LineKey::new(product_id, size, color);
        let mut next = self.lines.clone();
        match next.iter_mut().find(|l| l.matches(&key)) {
            Some(line) => {
                let merged = line.quantity.saturating_add(quantity);
                if merged > MAX_LINE_QUANTITY {
                    return Err(CartError::InvalidQuantity { quantity: merged });
                }
                line.quantity = merged;
            }
            None => next.push(CartLine {
                product_id: key.product_id.clone(),
                name: product.name.clone(),
                unit_price: product.price,
                image: product.thumbnail().map(str::to_string),
                stock: product.stock,
                size: key.size.clone(),
                color: key.color.clone(),
                quantity,
            }),
        }

        debug!(line = %key, quantity, "Adding item to cart");
        self.commit(next)
    }

    /// Adjusts a line's quantity by `delta`, clamped to
    /// `1..=MAX_LINE_QUANTITY`.
    ///
    /// Returns the resulting quantity. Use [`remove_item`](Self::remove_item)
    /// to delete a line.
    pub fn set_quantity(&mut self, key: &LineKey, delta: i32) -> Result<u32, CartError> {
        let mut next = self.lines.clone();
        let line = next
            .iter_mut()
            .find(|l| l.matches(key))
            .ok_or_else(|| CartError::LineNotFound { key: key.clone() })?;

        let updated = (i64::from(line.quantity) + i64::from(delta))
            .clamp(1, i64::from(MAX_LINE_QUANTITY));
        line.quantity = u32::try_from(updated).unwrap_or(MAX_LINE_QUANTITY);
        let quantity = line.quantity;

        self.commit(next)?;
        Ok(quantity)
    }

    /// Removes a line entirely, returning it.
    pub fn remove_item(&mut self, key: &LineKey) -> Result<CartLine, CartError> {
        let mut next = self.lines.clone();
        let position = next
            .iter()
            .position(|l| l.matches(key))
            .ok_or_else(|| CartError::LineNotFound { key: key.clone() })?;
        let removed = next.remove(position);

        self.commit(next)?;
        Ok(removed)
    }

    /// Empties the cart.
    pub fn clear(&mut self) -> Result<(), CartError> {
        self.store.remove(CART_KEY)?;
        self.lines.clear();
        self.publish();
        Ok(())
    }

    /// Sum of unit price times quantity over all lines.
    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Sum of quantities over all lines.
    pub fn item_count(&self) -> u64 {
        count_items(&self.lines)
    }

    /// Lines in insertion order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Finds a line by key.
    pub fn line(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.matches(key))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns a frozen copy of the current lines.
    pub fn snapshot(&self) -> Vec<CartLine> {
        self.lines.clone()
    }

    /// Returns the current summary.
    pub fn summary(&self) -> CartSummary {
        CartSummary::of(&self.lines)
    }

    /// Subscribes to cart change notifications.
    pub fn subscribe(&self) -> watch::Receiver<CartSummary> {
        self.notifier.subscribe()
    }

    fn commit(&mut self, next: Vec<CartLine>) -> Result<(), CartError> {
        self.store.set(CART_KEY, &encode_cart(&next)?)?;
        self.lines = next;
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        self.notifier.send_replace(CartSummary::of(&self.lines));
    }
}
