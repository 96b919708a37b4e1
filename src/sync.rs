//! The fetch half of a sync run: every page is read before anything is written.
use std::time::Duration;
use tracing::info;

use crate::config;
use crate::error::Result;
use crate::model::Snapshot;
use crate::ordoro::{paginate, InventorySource};
use crate::transform;

/// What to fetch and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub product_path: String,
    pub inventory_path: String,
    pub page_size: usize,
}

impl SyncOptions {
    pub fn from_config(cfg: &config::Ordoro) -> Self {
        Self {
            product_path: cfg.product_path.clone(),
            inventory_path: cfg.inventory_path.clone(),
            page_size: cfg.page_limit,
        }
    }
}

/// Authenticate, walk both endpoints and build the deduplicated snapshot.
/// When both endpoints are the same path it is walked once.
pub async fn fetch_snapshot<S>(source: &S, opts: &SyncOptions) -> Result<Snapshot>
where
    S: InventorySource + ?Sized,
{
    source.authenticate().await?;

    let product_items = paginate(source, &opts.product_path, opts.page_size).await?;
    let inventory_items = if opts.inventory_path == opts.product_path {
        None
    } else {
        Some(paginate(source, &opts.inventory_path, opts.page_size).await?)
    };

    let snapshot = transform::build_snapshot(
        &product_items,
        inventory_items.as_deref().unwrap_or(&product_items),
    );
    info!(
        product_items = product_items.len(),
        products = snapshot.products.len(),
        warehouse_rows = snapshot.inventory.len(),
        "fetched snapshot"
    );
    Ok(snapshot)
}

/// `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(61_900)), "00:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 5)), "03:00:05");
    }

    #[test]
    fn options_follow_config() {
        let cfg = config::from_map(&config::example()).unwrap();
        let opts = SyncOptions::from_config(&cfg.ordoro);
        assert_eq!(opts.product_path, "product/");
        assert_eq!(opts.inventory_path, "product/");
        assert_eq!(opts.page_size, 100);
    }
}
