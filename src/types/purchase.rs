//! Shop catalog and purchase types
//!
//! Products carry the authoritative price and stock; carts reference them by
//! id only and are re-priced inside the purchase transaction. A Purchase
//! records what was actually sold, at what price, with its fulfilment and
//! dispute state.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product identity in the shop catalog
pub type ProductId = String;

/// A shop catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,

    /// Current price in points; re-read inside every purchase transaction
    pub unit_price: i64,

    /// Remaining stock (invariant: never driven negative)
    pub stock: u32,
}

/// One line of a client-submitted cart
///
/// Carries no price: the client is never trusted with pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: ProductId,
    pub quantity: u32,
}

/// One line of a committed purchase, priced at commit time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasedItem {
    pub product: ProductId,
    pub name: String,
    pub unit_price: i64,
    pub quantity: u32,
}

/// Fulfilment state of a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Awaiting staff fulfilment
    Pending,
    Completed,
}

/// Dispute state of a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    None,
    Open,
    Resolved,
}

/// A committed purchase
///
/// Created atomically with the matching debit and stock decrement; the
/// status and dispute fields are later mutated by the staff workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub account: AccountId,
    pub items: Vec<PurchasedItem>,

    /// Final discounted total actually debited
    pub total_cost: i64,
    pub status: PurchaseStatus,
    pub dispute: DisputeStatus,

    /// Short human-readable receipt code handed to the buyer
    pub receipt: String,
    pub created_at: DateTime<Utc>,
}
