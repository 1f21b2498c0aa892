//! Adapters implementing the domain ports: storage backends, the simulated
//! payment processor and operator authentication.

pub mod auth;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated_processor;
