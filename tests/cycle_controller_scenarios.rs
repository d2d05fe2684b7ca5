//! End-to-end reproductions of the concrete scenarios this engine must get
//! right, driving `CycleController` through its public API only (no access
//! to its private fields) exactly as the Supervisor would. Scenario A
//! (single buy, partial sell, full sell, reset) and the drift halt are
//! covered by `CycleController`'s own unit tests; this file covers the
//! remaining scenarios that need a fresh controller per act.

use async_trait::async_trait;
use chrono::Utc;
use dca_engine::application::cycle_controller::CycleController;
use dca_engine::domain::candle::Candle;
use dca_engine::domain::cycle::{CycleState, CycleStatus, WriteAheadIntent};
use dca_engine::domain::errors::{ExchangeError, PersistenceError};
use dca_engine::domain::events::Event;
use dca_engine::domain::order::{
    Balances, ExchangeRules, OrderOutcome, OrderRequest, OrderSide, OrderStatus,
};
use dca_engine::domain::pause_state::PauseState;
use dca_engine::domain::ports::{
    Clock, CycleStateStore, EventSink, ExchangeClient, PauseStateRepository, TradeRepository,
};
use dca_engine::domain::strategy_config::{StrategyConfig, ATH_WINDOW};
use dca_engine::domain::trade::TradeRecord;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use uuid::Uuid;

struct FixedClock(chrono::DateTime<Utc>);
impl Clock for FixedClock {
    fn now(&self) -> chrono::DateTime<Utc> {
        self.0
    }
}

struct NullTradeRepo;
#[async_trait]
impl TradeRepository for NullTradeRepo {
    async fn append(&self, _trade: &TradeRecord) -> Result<(), PersistenceError> {
        Ok(())
    }
}

struct NullEventSink;
#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: Event) -> Result<(), PersistenceError> {
        Ok(())
    }
}

struct NullPauseRepo;
#[async_trait]
impl PauseStateRepository for NullPauseRepo {
    async fn record_pause(&self, _pause: &PauseState) -> Result<(), PersistenceError> {
        Ok(())
    }
    async fn record_resume(&self, _resumed_at: chrono::DateTime<Utc>) -> Result<(), PersistenceError> {
        Ok(())
    }
}

struct RecordingStore {
    committed: StdMutex<Vec<CycleState>>,
}
impl RecordingStore {
    fn new() -> Self {
        Self { committed: StdMutex::new(Vec::new()) }
    }
}
#[async_trait]
impl CycleStateStore for RecordingStore {
    async fn load(&self, config: &StrategyConfig) -> Result<CycleState, PersistenceError> {
        Ok(CycleState::new_ready(config, Utc::now()))
    }
    async fn commit(&self, state: &CycleState) -> Result<(), PersistenceError> {
        self.committed.lock().unwrap().push(state.clone());
        Ok(())
    }
}

struct ScriptedExchange {
    balances: Balances,
    order_responses: StdMutex<Vec<Result<OrderOutcome, ExchangeError>>>,
    get_order_responses: StdMutex<Vec<Result<OrderOutcome, ExchangeError>>>,
    calls: AtomicUsize,
}
impl ScriptedExchange {
    fn with_balances(balances: Balances) -> Self {
        Self {
            balances,
            order_responses: StdMutex::new(Vec::new()),
            get_order_responses: StdMutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}
#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn place_ioc_limit_order(&self, _request: &OrderRequest) -> Result<OrderOutcome, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order_responses.lock().unwrap().remove(0)
    }
    async fn get_order(&self, _client_order_id: Uuid) -> Result<OrderOutcome, ExchangeError> {
        self.get_order_responses.lock().unwrap().remove(0)
    }
    async fn get_balances(&self) -> Result<Balances, ExchangeError> {
        Ok(self.balances)
    }
    async fn get_exchange_rules(&self, _symbol: &str) -> Result<ExchangeRules, ExchangeError> {
        unimplemented!("rules are passed directly into process_candle/reconcile in these tests")
    }
}

fn config() -> StrategyConfig {
    StrategyConfig {
        timeframe: "4h".into(),
        drop_pct: dec!(0.05),
        rise_pct: dec!(0.05),
        max_purchases: 3,
        min_buy_usdt: dec!(10),
        initial_capital_usdt: dec!(300),
        slippage_buy_pct: dec!(0.003),
        slippage_sell_pct: dec!(0.003),
        is_active: true,
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

fn candle(close: Decimal) -> Candle {
    Candle { open_time: 0, close_time: 1, open: close, high: close, low: close, close, closed: true }
}

fn window_at(ath: Decimal) -> Vec<Candle> {
    (0..ATH_WINDOW)
        .map(|i| Candle { open_time: i as i64, close_time: i as i64 + 1, open: ath, high: ath, low: ath, close: ath, closed: true })
        .collect()
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

fn controller(
    state: CycleState,
    cfg: StrategyConfig,
    exchange: Arc<ScriptedExchange>,
    store: Arc<RecordingStore>,
) -> CycleController {
    CycleController::new(
        state,
        cfg,
        store,
        exchange,
        Arc::new(NullEventSink),
        Arc::new(NullTradeRepo),
        Arc::new(NullPauseRepo),
        Arc::new(FixedClock(Utc::now())),
    )
}

/// Scenario B: the exchange reports an expired IOC with zero fill. The
/// candle should leave state untouched and the next candle re-evaluates
/// from the same slot.
#[tokio::test]
async fn scenario_b_ioc_expires_with_zero_fill_leaves_state_untouched() {
    let cfg = config();
    let state = CycleState::new_ready(&cfg, Utc::now());
    let balances = Balances { usdt: state.capital_available_usdt, btc: Decimal::ZERO };
    let exchange = Arc::new(ScriptedExchange::with_balances(balances));
    exchange.order_responses.lock().unwrap().push(Ok(OrderOutcome {
        client_order_id: Uuid::nil(),
        exchange_order_id: Some("1".into()),
        status: OrderStatus::Expired,
        filled_qty: Decimal::ZERO,
        quote_qty: Decimal::ZERO,
        avg_price: Decimal::ZERO,
        fee_base: Decimal::ZERO,
        fee_quote: Decimal::ZERO,
        fee_other: HashMap::new(),
        reason: Some("EXPIRED".into()),
    }));
    let store = Arc::new(RecordingStore::new());
    let ctl = controller(state.clone(), cfg, exchange.clone(), store);

    let window = window_at(dec!(50000));
    ctl.process_candle(candle(dec!(47500)), &window, &rules()).await.unwrap();

    let after = ctl.snapshot().await;
    assert_eq!(after.status, CycleStatus::Ready);
    assert_eq!(after.purchases_remaining, state.purchases_remaining);
    assert_eq!(after.btc_accumulated, Decimal::ZERO);
    assert_eq!(after.capital_available_usdt, state.capital_available_usdt);
}

/// Scenario C: a partial sell fill leaves the remainder HOLDING with its
/// accumulators unchanged, no profit realized.
#[tokio::test]
async fn scenario_c_partial_sell_leaves_remainder_holding() {
    let cfg = config();
    let mut state = CycleState::new_ready(&cfg, Utc::now());
    state.status = CycleStatus::Holding;
    state.btc_accumulated = dec!(1.0);
    state.cost_accum_usdt = dec!(40000);
    state.btc_accum_net = dec!(1.0);
    state.reference_price = dec!(40000);
    state.ath_price = dec!(50000);
    state.purchases_remaining = 2;
    state.purchases_executed = 1;

    let balances = Balances { usdt: state.capital_available_usdt, btc: state.btc_accumulated };
    let exchange = Arc::new(ScriptedExchange::with_balances(balances));
    // Sell trigger at reference*1.05 = 42000; fill only 0.6 of the 1.0 held.
    exchange.order_responses.lock().unwrap().push(Ok(filled(dec!(0.6), dec!(25200), dec!(42000))));
    let store = Arc::new(RecordingStore::new());
    let ctl = controller(state.clone(), cfg, exchange, store);

    let window = window_at(dec!(50000));
    ctl.process_candle(candle(dec!(42000)), &window, &rules()).await.unwrap();

    let after = ctl.snapshot().await;
    assert_eq!(after.status, CycleStatus::Holding);
    assert_eq!(after.btc_accumulated, dec!(0.4));
    assert_eq!(after.cost_accum_usdt, state.cost_accum_usdt);
    assert_eq!(after.btc_accum_net, state.btc_accum_net);
    assert_eq!(after.reference_price, state.reference_price);
}

/// Scenario E: a write-ahead intent survives a restart with no observed
/// result. Reconciliation must call `get_order` and apply whatever it
/// finds: FILLED applies the fill, NOT_FOUND discards the intent.
#[tokio::test]
async fn scenario_e_restart_reconciliation_applies_a_filled_pending_buy() {
    let cfg = config();
    let mut state = CycleState::new_ready(&cfg, Utc::now());
    let intent_id = Uuid::new_v4();
    state.pending_intent = Some(WriteAheadIntent { client_order_id: intent_id, side: OrderSide::Buy, created_at: Utc::now() });

    let balances = Balances { usdt: state.capital_available_usdt, btc: Decimal::ZERO };
    let exchange = Arc::new(ScriptedExchange::with_balances(balances));
    exchange
        .get_order_responses
        .lock()
        .unwrap()
        .push(Ok(filled(dec!(0.0021), dec!(100), dec!(47600))));
    let store = Arc::new(RecordingStore::new());
    let ctl = controller(state, cfg, exchange, store);

    ctl.reconcile_pending_intent(&rules()).await.unwrap();

    let after = ctl.snapshot().await;
    assert!(after.pending_intent.is_none());
    assert_eq!(after.status, CycleStatus::Holding);
    assert_eq!(after.btc_accumulated, dec!(0.0021));
}

#[tokio::test]
async fn scenario_e_restart_reconciliation_discards_a_not_found_intent() {
    let cfg = config();
    let mut state = CycleState::new_ready(&cfg, Utc::now());
    let intent_id = Uuid::new_v4();
    state.pending_intent = Some(WriteAheadIntent { client_order_id: intent_id, side: OrderSide::Buy, created_at: Utc::now() });

    let balances = Balances { usdt: state.capital_available_usdt, btc: Decimal::ZERO };
    let exchange = Arc::new(ScriptedExchange::with_balances(balances));
    exchange
        .get_order_responses
        .lock()
        .unwrap()
        .push(Err(ExchangeError::NonRetryable("order not found".to_string())));
    let store = Arc::new(RecordingStore::new());
    let ctl = controller(state.clone(), cfg, exchange, store);

    ctl.reconcile_pending_intent(&rules()).await.unwrap();

    let after = ctl.snapshot().await;
    assert!(after.pending_intent.is_none());
    assert_eq!(after.status, CycleStatus::Ready);
    assert_eq!(after.btc_accumulated, Decimal::ZERO);
}

/// Scenario F: the last purchase slot spends whatever capital remains,
/// not the pre-computed per-slot buy_amount_usdt.
#[tokio::test]
async fn scenario_f_last_purchase_uses_remaining_capital() {
    let cfg = config();
    let mut state = CycleState::new_ready(&cfg, Utc::now());
    state.purchases_remaining = 1;
    state.purchases_executed = 2;
    state.capital_available_usdt = dec!(57.40);
    state.ath_price = dec!(50000);

    let balances = Balances { usdt: state.capital_available_usdt, btc: Decimal::ZERO };
    let exchange = Arc::new(ScriptedExchange::with_balances(balances));
    exchange.order_responses.lock().unwrap().push(Ok(filled(dec!(0.0012), dec!(57.40), dec!(47500))));
    let store = Arc::new(RecordingStore::new());
    let ctl = controller(state, cfg, exchange.clone(), store);

    let window = window_at(dec!(50000));
    ctl.process_candle(candle(dec!(47500)), &window, &rules()).await.unwrap();

    assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    let after = ctl.snapshot().await;
    assert_eq!(after.status, CycleStatus::Holding);
    assert_eq!(after.capital_available_usdt, Decimal::ZERO);
    assert_eq!(after.purchases_remaining, 0);
}
