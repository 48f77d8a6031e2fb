//! Records owned by the document store.
//!
//! Field names follow the stored schema (camelCase; the affiliate referral
//! code is stored as `codigoReferencia`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::value_objects::{AffiliateId, BuyerId, LineKey, Money, OrderId, ProductId};

/// Commission percent applied when an affiliate has none configured.
pub const DEFAULT_COMMISSION_PERCENT: u32 = 10;

/// A catalog product (`products/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub name: String,
    pub price: Money,
    pub stock: i64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

impl Product {
    /// Stock count field, decremented atomically during settlement.
    pub const STOCK: &'static str = "stock";
    /// `{orderId}|{lineKey}` entries whose decrement has been applied.
    pub const SETTLED_LINES: &'static str = "settledLines";

    /// Returns the first image, used as the cart thumbnail.
    pub fn thumbnail(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Role of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Customer,
    Affiliate,
    Admin,
}

/// A registered user (`users/{uid}`), written by registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: BuyerId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
}

/// An affiliate ledger (`affiliates/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub name: String,
    #[serde(rename = "codigoReferencia")]
    pub referral_code: String,
    #[serde(default)]
    pub commission_percent: Option<u32>,
    #[serde(default)]
    pub balance: Money,
    #[serde(default)]
    pub sale_count: u64,
    #[serde(default)]
    pub click_count: u64,
}

impl Affiliate {
    pub const REFERRAL_CODE: &'static str = "codigoReferencia";
    pub const BALANCE: &'static str = "balance";
    pub const SALE_COUNT: &'static str = "saleCount";
    pub const CLICK_COUNT: &'static str = "clickCount";
    /// Ids of the orders already credited to this affiliate.
    pub const CREDITED_ORDERS: &'static str = "creditedOrders";

    /// Creates a fresh affiliate ledger with the default commission.
    pub fn new(name: impl Into<String>, referral_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            referral_code: referral_code.into(),
            commission_percent: None,
            balance: Money::zero(),
            sale_count: 0,
            click_count: 0,
        }
    }

    /// Returns the effective commission percent.
    pub fn commission_percent(&self) -> u32 {
        self.commission_percent
            .unwrap_or(DEFAULT_COMMISSION_PERCENT)
    }
}

/// Payment method chosen on the checkout form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Pix,
    Card,
    Boleto,
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
}

/// Fulfillment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    Processing,
    /// Settlement found the stock exhausted for at least one line.
    Backordered,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    /// Returns the stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Backordered => "backordered",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }
}

/// Delivery details entered on the checkout form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    pub name: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
}

impl ShippingDetails {
    /// Returns the names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("address", &self.address),
            ("city", &self.city),
            ("postalCode", &self.postal_code),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

/// A line item frozen into an order at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub size: String,
    pub color: String,
    pub quantity: u32,
}

impl OrderLine {
    /// Returns the composite key of this line.
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product_id.clone(), &self.size, &self.color)
    }

    /// Returns unit price times quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            unit_price: line.unit_price,
            size: line.size.clone(),
            color: line.color.clone(),
            quantity: line.quantity,
        }
    }
}

/// Settlement progress markers stored on the order.
///
/// Each post-commit effect records its marker right after it is applied, so
/// a retry or a reconciliation pass only redoes what is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub commission_recorded: bool,
    pub affiliate_credited: bool,
    /// Line keys whose stock decrement has been applied.
    pub stock_settled: Vec<String>,
    /// Line keys whose decrement found the stock exhausted.
    pub shortfalls: Vec<String>,
    /// Every effect is applied; only marker cleanup may remain.
    #[serde(default)]
    pub effects_applied: bool,
    pub completed: bool,
}

impl Settlement {
    pub const COMMISSION_RECORDED: &'static str = "settlement.commissionRecorded";
    pub const AFFILIATE_CREDITED: &'static str = "settlement.affiliateCredited";
    pub const STOCK_SETTLED: &'static str = "settlement.stockSettled";
    pub const SHORTFALLS: &'static str = "settlement.shortfalls";
    pub const EFFECTS_APPLIED: &'static str = "settlement.effectsApplied";
    pub const COMPLETED: &'static str = "settlement.completed";

    /// Returns true if the line's stock effect has been handled.
    pub fn is_line_settled(&self, key: &LineKey) -> bool {
        let key = key.to_string();
        self.stock_settled.contains(&key) || self.shortfalls.contains(&key)
    }
}

/// A paid order (`orders/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub buyer_id: BuyerId,
    pub buyer_name: String,
    pub buyer_email: String,
    pub shipping: ShippingDetails,
    pub payment_method: PaymentMethod,
    pub line_items: Vec<OrderLine>,
    pub total: Money,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub affiliate_id: Option<AffiliateId>,
    /// Commission owed, frozen at order time with the affiliate's percent.
    pub commission_amount: Option<Money>,
    #[serde(default)]
    pub settlement: Settlement,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub const FULFILLMENT_STATUS: &'static str = "fulfillmentStatus";

    /// Creates a paid, processing order. The total is computed once from
    /// the frozen lines.
    pub fn paid(
        buyer_id: BuyerId,
        buyer_name: impl Into<String>,
        shipping: ShippingDetails,
        payment_method: PaymentMethod,
        line_items: Vec<OrderLine>,
    ) -> Self {
        let total = line_items.iter().map(OrderLine::line_total).sum();
        Self {
            buyer_id,
            buyer_name: buyer_name.into(),
            buyer_email: shipping.email.clone(),
            shipping,
            payment_method,
            line_items,
            total,
            payment_status: PaymentStatus::Paid,
            fulfillment_status: FulfillmentStatus::Processing,
            affiliate_id: None,
            commission_amount: None,
            settlement: Settlement::default(),
            created_at: Utc::now(),
        }
    }

    /// Attributes the order to an affiliate with a frozen commission.
    pub fn with_affiliate(mut self, affiliate_id: AffiliateId, commission: Money) -> Self {
        self.affiliate_id = Some(affiliate_id);
        self.commission_amount = Some(commission);
        self
    }
}

/// Commission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
}

/// A commission owed for one order (`commissions/{orderId}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub order_id: OrderId,
    pub affiliate_id: AffiliateId,
    pub amount: Money,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    /// Creates a pending commission.
    pub fn pending(order_id: OrderId, affiliate_id: AffiliateId, amount: Money) -> Self {
        Self {
            order_id,
            affiliate_id,
            amount,
            status: CommissionStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
