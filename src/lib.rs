//! Daily batch job that copies Ordoro inventory and product data into
//! Snowflake, replacing `INVENTORY_PRODUCT_LEVEL` and
//! `INVENTORY_WAREHOUSE_LEVEL` on every run.

pub mod config;
pub mod error;
pub mod model;
pub mod ordoro;
pub mod retry;
pub mod sync;
pub mod transform;
pub mod warehouse;

pub use error::{Result, SyncError};
