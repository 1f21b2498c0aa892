//! Application layer orchestrating checkouts over the domain and its ports.
//!
//! `CheckoutOrchestrator` prices and creates payment sessions,
//! `PaymentSessionStateMachine` owns every later status change, and
//! `SessionTracker` drives PIX countdown and settlement polling as a
//! cancellable task. `AdminService` exposes the operator operations.

pub mod admin;
pub mod checkout;
pub mod coupon_validator;
pub mod session;
pub mod tracker;
