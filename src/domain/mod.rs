//! Domain layer: checkout types and the rules that hold regardless of storage
//! or transport.
//!
//! Everything here is synchronous and free of I/O except the port traits in
//! [`ports`], which the infrastructure layer implements.

pub mod clock;
pub mod coupon;
pub mod customer;
pub mod money;
pub mod payment;
pub mod ports;
pub mod pricing;
