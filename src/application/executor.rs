//! Order Executor (C7): builds and validates IOC limit orders, submits them
//! with bounded retry and ambiguity resolution, and aggregates fill fees.

use crate::domain::decimal::{round_to_step_down, round_to_tick_down, round_to_tick_up};
use crate::domain::errors::ExchangeError;
use crate::domain::order::{ExchangeErrorKind, ExchangeRules, OrderOutcome, OrderRequest, OrderSide};
use crate::domain::ports::ExchangeClient;
use crate::domain::strategy_config::ORDER_SUBMIT_MAX_ATTEMPTS;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExchangeClient>) -> Self {
        Self { client }
    }

    /// Builds the buy request per §4.7: `limit_price = round_to_tick_up(ref_close * (1 + slippage))`,
    /// `quantity = round_to_step_down(desired_usdt / limit_price)`. Returns
    /// `Err(reason)` if the resulting order would violate `rules`.
    fn build_buy(
        client_order_id: Uuid,
        desired_usdt: Decimal,
        ref_close: Decimal,
        slippage: Decimal,
        rules: &ExchangeRules,
    ) -> Result<OrderRequest, String> {
        let limit_price = round_to_tick_up(ref_close * (Decimal::ONE + slippage), rules.tick)
            .map_err(|e| e.to_string())?;
        if limit_price.is_zero() {
            return Err("limit price rounds to zero".to_string());
        }
        let quantity = round_to_step_down(desired_usdt / limit_price, rules.step)
            .map_err(|e| e.to_string())?;
        Self::validate_rules(quantity, limit_price, rules)?;
        Ok(OrderRequest {
            client_order_id,
            side: OrderSide::Buy,
            limit_price,
            quantity,
        })
    }

    /// Builds the sell request per §4.7: `limit_price = round_to_tick_down(ref_close * (1 - slippage))`,
    /// `quantity = round_to_step_down(btc_to_sell)`.
    fn build_sell(
        client_order_id: Uuid,
        btc_to_sell: Decimal,
        ref_close: Decimal,
        slippage: Decimal,
        rules: &ExchangeRules,
    ) -> Result<OrderRequest, String> {
        let limit_price = round_to_tick_down(ref_close * (Decimal::ONE - slippage), rules.tick)
            .map_err(|e| e.to_string())?;
        let quantity = round_to_step_down(btc_to_sell, rules.step).map_err(|e| e.to_string())?;
        Self::validate_rules(quantity, limit_price, rules)?;
        Ok(OrderRequest {
            client_order_id,
            side: OrderSide::Sell,
            limit_price,
            quantity,
        })
    }

    fn validate_rules(quantity: Decimal, limit_price: Decimal, rules: &ExchangeRules) -> Result<(), String> {
        if quantity < rules.min_qty {
            return Err(format!("quantity {quantity} below min_qty {}", rules.min_qty));
        }
        if quantity > rules.max_qty {
            return Err(format!("quantity {quantity} above max_qty {}", rules.max_qty));
        }
        let notional = quantity * limit_price;
        if notional < rules.min_notional {
            return Err(format!(
                "notional {notional} below min_notional {}",
                rules.min_notional
            ));
        }
        Ok(())
    }

    pub async fn place_buy(
        &self,
        client_order_id: Uuid,
        desired_usdt: Decimal,
        ref_close: Decimal,
        slippage: Decimal,
        rules: &ExchangeRules,
    ) -> OrderOutcome {
        match Self::build_buy(client_order_id, desired_usdt, ref_close, slippage, rules) {
            Ok(request) => self.submit_with_retry(request).await,
            Err(reason) => OrderOutcome::rejected_locally(client_order_id, reason),
        }
    }

    pub async fn place_sell(
        &self,
        client_order_id: Uuid,
        btc_to_sell: Decimal,
        ref_close: Decimal,
        slippage: Decimal,
        rules: &ExchangeRules,
    ) -> OrderOutcome {
        match Self::build_sell(client_order_id, btc_to_sell, ref_close, slippage, rules) {
            Ok(request) => self.submit_with_retry(request).await,
            Err(reason) => OrderOutcome::rejected_locally(client_order_id, reason),
        }
    }

    /// Submits `request`, retrying up to `ORDER_SUBMIT_MAX_ATTEMPTS` times on
    /// retryable errors with doubling backoff. An ambiguous outcome (timeout
    /// after send) is resolved via `get_order` before any retry decision is
    /// made, so the same order is never placed twice (§4.7, §5).
    async fn submit_with_retry(&self, request: OrderRequest) -> OrderOutcome {
        let mut backoff = Duration::from_millis(250);
        let mut last_error: Option<ExchangeError> = None;

        for attempt in 1..=ORDER_SUBMIT_MAX_ATTEMPTS {
            match self.client.place_ioc_limit_order(&request).await {
                Ok(outcome) => return outcome,
                Err(err) => match err.kind() {
                    ExchangeErrorKind::NonRetryable => {
                        error!(client_order_id = %request.client_order_id, error = %err, "order rejected, not retrying");
                        return OrderOutcome::rejected_locally(request.client_order_id, err.to_string());
                    }
                    ExchangeErrorKind::Ambiguous => {
                        warn!(client_order_id = %request.client_order_id, "ambiguous submission, resolving via get_order");
                        match self.client.get_order(request.client_order_id).await {
                            Ok(outcome) => return outcome,
                            Err(lookup_err) => {
                                // Whether the order reached the exchange is now
                                // unknown. Resubmitting here could double-place
                                // it, so this attempt is terminal: hand an
                                // unresolved outcome back to the controller,
                                // which leaves the write-ahead intent in place
                                // for reconciliation on the next restart rather
                                // than clearing it (§4.5, §4.7).
                                error!(
                                    client_order_id = %request.client_order_id,
                                    submit_error = %err,
                                    lookup_error = %lookup_err,
                                    "get_order lookup failed after ambiguous submission, not resubmitting"
                                );
                                return OrderOutcome::unresolved(
                                    request.client_order_id,
                                    format!("ambiguous submission ({err}), status lookup also failed ({lookup_err})"),
                                );
                            }
                        }
                    }
                    ExchangeErrorKind::Retryable => {
                        warn!(attempt, client_order_id = %request.client_order_id, error = %err, "retryable order error");
                        last_error = Some(err);
                    }
                },
            }

            if attempt < ORDER_SUBMIT_MAX_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        OrderOutcome::rejected_locally(
            request.client_order_id,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "exhausted retries".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Balances, OrderStatus};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubClient {
        calls: AtomicUsize,
        responses: Vec<Result<OrderOutcome, ExchangeError>>,
        get_order_response: Option<Result<OrderOutcome, ExchangeError>>,
    }

    #[async_trait]
    impl ExchangeClient for StubClient {
        async fn place_ioc_limit_order(
            &self,
            request: &OrderRequest,
        ) -> Result<OrderOutcome, ExchangeError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = request;
            self.responses[i].clone()
        }

        async fn get_order(&self, client_order_id: Uuid) -> Result<OrderOutcome, ExchangeError> {
            match &self.get_order_response {
                Some(Ok(outcome)) => Ok(OrderOutcome {
                    client_order_id,
                    ..outcome.clone()
                }),
                Some(Err(e)) => Err(e.clone()),
                None => panic!("unexpected get_order call"),
            }
        }

        async fn get_balances(&self) -> Result<Balances, ExchangeError> {
            unimplemented!()
        }

        async fn get_exchange_rules(&self, _symbol: &str) -> Result<ExchangeRules, ExchangeError> {
            unimplemented!()
        }
    }

    fn rules() -> ExchangeRules {
        ExchangeRules {
            tick: dec!(0.01),
            step: dec!(0.00001),
            min_qty: dec!(0.00001),
            max_qty: dec!(1000),
            min_notional: dec!(10),
        }
    }

    fn filled(qty: Decimal, quote: Decimal, price: Decimal) -> OrderOutcome {
        OrderOutcome {
            client_order_id: Uuid::nil(),
            exchange_order_id: Some("1".to_string()),
            status: OrderStatus::Filled,
            filled_qty: qty,
            quote_qty: quote,
            avg_price: price,
            fee_base: Decimal::ZERO,
            fee_quote: Decimal::ZERO,
            fee_other: HashMap::new(),
            reason: None,
        }
    }

    #[test]
    fn build_buy_rounds_price_up_and_quantity_down() {
        let req = OrderExecutor::build_buy(
            Uuid::nil(),
            dec!(100),
            dec!(47500),
            dec!(0.003),
            &rules(),
        )
        .unwrap();
        assert_eq!(req.limit_price, dec!(47642.50));
        assert_eq!(req.quantity, dec!(0.00209));
    }

    #[test]
    fn build_buy_rejects_below_min_notional() {
        let err = OrderExecutor::build_buy(
            Uuid::nil(),
            dec!(1),
            dec!(47500),
            dec!(0.003),
            &rules(),
        )
        .unwrap_err();
        assert!(err.contains("min_notional"));
    }

    #[test]
    fn build_sell_rounds_price_down() {
        let req = OrderExecutor::build_sell(
            Uuid::nil(),
            dec!(0.002099),
            dec!(50074),
            dec!(0.003),
            &rules(),
        )
        .unwrap();
        assert_eq!(req.limit_price, dec!(49923.77));
        assert_eq!(req.quantity, dec!(0.00209));
    }

    #[tokio::test]
    async fn place_buy_returns_rejected_locally_without_contacting_exchange() {
        let client = StubClient {
            calls: AtomicUsize::new(0),
            responses: vec![],
            get_order_response: None,
        };
        let executor = OrderExecutor::new(Arc::new(client));
        let outcome = executor
            .place_buy(Uuid::nil(), dec!(1), dec!(47500), dec!(0.003), &rules())
            .await;
        assert_eq!(outcome.status, OrderStatus::RejectedLocally);
    }

    #[tokio::test]
    async fn retries_on_retryable_error_then_succeeds() {
        let client = StubClient {
            calls: AtomicUsize::new(0),
            responses: vec![
                Err(ExchangeError::Retryable("timeout".to_string())),
                Ok(filled(dec!(0.00209), dec!(100), dec!(47642.50))),
            ],
            get_order_response: None,
        };
        let executor = OrderExecutor::new(Arc::new(client));
        let outcome = executor
            .place_buy(Uuid::nil(), dec!(100), dec!(47500), dec!(0.003), &rules())
            .await;
        assert_eq!(outcome.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn non_retryable_error_does_not_retry() {
        let client = StubClient {
            calls: AtomicUsize::new(0),
            responses: vec![Err(ExchangeError::NonRetryable("insufficient funds".to_string()))],
            get_order_response: None,
        };
        let executor = OrderExecutor::new(Arc::new(client));
        let outcome = executor
            .place_buy(Uuid::nil(), dec!(100), dec!(47500), dec!(0.003), &rules())
            .await;
        assert_eq!(outcome.status, OrderStatus::RejectedLocally);
    }

    #[tokio::test]
    async fn ambiguous_error_resolves_via_get_order() {
        let client = StubClient {
            calls: AtomicUsize::new(0),
            responses: vec![Err(ExchangeError::Ambiguous("timeout after send".to_string()))],
            get_order_response: Some(Ok(filled(dec!(0.00209), dec!(100), dec!(47642.50)))),
        };
        let executor = OrderExecutor::new(Arc::new(client));
        let outcome = executor
            .place_buy(Uuid::nil(), dec!(100), dec!(47500), dec!(0.003), &rules())
            .await;
        assert_eq!(outcome.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn ambiguous_error_with_failed_lookup_does_not_resubmit() {
        let client = StubClient {
            calls: AtomicUsize::new(0),
            // Only one scripted submission response: if the executor ever
            // resubmitted after the failed lookup below, it would index past
            // this vec and panic.
            responses: vec![Err(ExchangeError::Ambiguous("timeout after send".to_string()))],
            get_order_response: Some(Err(ExchangeError::Retryable("network error".to_string()))),
        };
        let executor = OrderExecutor::new(Arc::new(client));
        let outcome = executor
            .place_buy(Uuid::nil(), dec!(100), dec!(47500), dec!(0.003), &rules())
            .await;
        assert_eq!(outcome.status, OrderStatus::Unresolved);
    }
}
