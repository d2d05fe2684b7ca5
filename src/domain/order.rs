//! Order-side wire types shared between the Order Executor (C7) and the
//! exchange client port: sides, fees, fill outcomes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Terminal status of a placed limit-IOC order (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    /// IOC expired without filling any quantity.
    Expired,
    /// Rejected before reaching the exchange (failed local validation).
    RejectedLocally,
    /// Rejected by the exchange (auth/rule-violation/insufficient-funds/etc).
    RejectedRemotely,
    /// Submission was ambiguous (timeout after send) and the follow-up
    /// `get_order` lookup also failed, so whether the order reached the
    /// exchange is still unknown. Left for the write-ahead intent to
    /// resolve on the next restart's reconciliation pass (§4.5, §4.7) —
    /// never safe to treat as a basis for resubmission.
    Unresolved,
}

impl OrderStatus {
    pub fn has_fill(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }
}

/// A fully-formed IOC limit order ready for submission, already rounded to
/// the symbol's tick/step and validated against exchange rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub side: OrderSide,
    pub limit_price: Decimal,
    pub quantity: Decimal,
}

/// Outcome of placing (or attempting to place) an order, after parsing fills
/// and aggregating fees across any partial-fill legs in the same response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub client_order_id: Uuid,
    pub exchange_order_id: Option<String>,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub quote_qty: Decimal,
    pub avg_price: Decimal,
    pub fee_base: Decimal,
    pub fee_quote: Decimal,
    /// Fees charged in a currency other than base/quote (e.g. BNB), keyed by
    /// asset symbol. Recorded in the ledger, excluded from reference-price math.
    pub fee_other: HashMap<String, Decimal>,
    pub reason: Option<String>,
}

impl OrderOutcome {
    pub fn rejected_locally(client_order_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            client_order_id,
            exchange_order_id: None,
            status: OrderStatus::RejectedLocally,
            filled_qty: Decimal::ZERO,
            quote_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee_base: Decimal::ZERO,
            fee_quote: Decimal::ZERO,
            fee_other: HashMap::new(),
            reason: Some(reason.into()),
        }
    }

    /// An ambiguous submission whose status lookup also failed (§4.7). Carries
    /// no fill information because none is known; the caller must leave the
    /// write-ahead intent in place rather than clear it.
    pub fn unresolved(client_order_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            client_order_id,
            exchange_order_id: None,
            status: OrderStatus::Unresolved,
            filled_qty: Decimal::ZERO,
            quote_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee_base: Decimal::ZERO,
            fee_quote: Decimal::ZERO,
            fee_other: HashMap::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Exchange symbol trading rules, cached and refreshed on a schedule (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRules {
    pub tick: Decimal,
    pub step: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub min_notional: Decimal,
}

/// Live spot balances as reported by the exchange, used by the Drift
/// Detector (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub usdt: Decimal,
    pub btc: Decimal,
}

/// How the exchange client classifies a transport/API-level failure (§6, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeErrorKind {
    /// Network error, timeout before send, 5xx, rate-limit: safe to retry.
    Retryable,
    /// Auth, permission, rule-violation, insufficient-funds: never retry.
    NonRetryable,
    /// Timeout after the request may have reached the exchange: resolve via
    /// `get_order` before deciding whether to retry.
    Ambiguous,
}
