//! Use-case orchestration over the domain types: the pure evaluators (C3,
//! C6, C8), the stateful controller that is the engine's single writer
//! (C9), and the supporting mechanisms around it (C2's window bookkeeping,
//! C7's execution pipeline, C10's pause policy, C11's batching adapter, and
//! C12's supervisor loop).

pub mod cycle_controller;
pub mod drift;
pub mod event_sink;
pub mod executor;
pub mod market_intake;
pub mod pause;
pub mod reference_price;
pub mod supervisor;
pub mod trigger;
