//! Append-only trade ledger row (§3 `TradeRecord`).

use crate::domain::order::{OrderSide, OrderStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub cycle_id: Uuid,
    pub side: OrderSide,
    pub client_order_id: Uuid,
    pub exchange_order_id: Option<String>,
    pub requested_price: Decimal,
    pub requested_qty: Decimal,
    pub filled_price: Decimal,
    pub filled_qty: Decimal,
    pub fee_base: Decimal,
    pub fee_quote: Decimal,
    pub fee_other: HashMap<String, Decimal>,
    pub status: OrderStatus,
    pub requested_at: DateTime<Utc>,
    pub settled_at: DateTime<Utc>,
}
