//! Persistence layer for the event catalog
//!
//! This module provides:
//! - [`EventStore`] trait for record persistence
//! - [`InMemoryEventStore`] for dev mode and testing
//! - [`PostgresEventStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, RecordFilter, StoreError};
