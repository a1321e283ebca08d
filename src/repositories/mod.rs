//! # Store queries
//!
//! Data-access functions over the SeaORM entities. Everything is generic
//! over [`sea_orm::ConnectionTrait`] so the same query runs against the
//! pool, a transaction, or the SQLite test database.

pub mod customer_token;
pub mod invoice;
pub mod probe_sample;
pub mod service;
pub mod service_domain;
pub mod storm_event;
pub mod storm_policy;
pub mod usage_snapshot;
