//! # Data Models
//!
//! SeaORM entities for the Tranche schema. Customers own services;
//! services own domains, storm policies, storm events, probe samples and
//! usage snapshots. Invoices hang off customers and outlive services.

pub mod customer;
pub mod customer_token;
pub mod invoice;
pub mod invoice_line_item;
pub mod probe_sample;
pub mod service;
pub mod service_domain;
pub mod storm_event;
pub mod storm_policy;
pub mod usage_snapshot;

pub use customer::Entity as Customer;
pub use customer_token::Entity as CustomerToken;
pub use invoice::Entity as Invoice;
pub use invoice_line_item::Entity as InvoiceLineItem;
pub use probe_sample::Entity as ProbeSample;
pub use service::Entity as Service;
pub use service_domain::Entity as ServiceDomain;
pub use storm_event::Entity as StormEvent;
pub use storm_policy::Entity as StormPolicy;
pub use usage_snapshot::Entity as UsageSnapshot;
