use chrono::NaiveDateTime;

/// One SKU at one warehouse location.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRecord {
    pub sku: String,
    pub warehouse_id: String,
    pub product_id: Option<i64>,
    pub warehouse_name: Option<String>,
    pub on_hand: i64,
    pub physical_on_hand: i64,
    pub available: i64,
    pub committed: i64,
    pub allocated: i64,
    pub unallocated: i64,
    pub mfg_ordered: i64,
    pub po_committed: i64,
    pub low_stock_threshold: Option<i64>,
    pub out_of_stock_threshold: Option<i64>,
    pub location: Option<String>,
    pub is_default_location: Option<bool>,
    pub is_configured_for_shipping: Option<bool>,
    /// UTC, zone stripped. Used for deduplication.
    pub updated: Option<NaiveDateTime>,
    pub warehouse_created: Option<NaiveDateTime>,
    pub warehouse_updated: Option<NaiveDateTime>,
}

impl InventoryRecord {
    pub fn key(&self) -> (&str, &str) {
        (&self.sku, &self.warehouse_id)
    }
}

/// One SKU, independent of warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub sku: String,
    pub product_id: Option<i64>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub cost: Option<f64>,
    pub upc: Option<String>,
    pub asin: Option<String>,
    pub country_of_origin: Option<String>,
    pub tags: String,
    /// `vendor:name` per sales channel, `|`-joined.
    pub carts: String,
    pub total_on_hand: Option<i64>,
    pub total_available: Option<i64>,
    pub total_committed: i64,
    pub total_allocated: i64,
    pub total_unallocated: i64,
    pub total_mfg_ordered: i64,
    pub to_be_shipped: i64,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub width: Option<f64>,
    pub updated: Option<NaiveDateTime>,
}

/// Both record sets of one run, deduplicated and ready to load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub products: Vec<ProductRecord>,
    pub inventory: Vec<InventoryRecord>,
}

/// Rows written per destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub product_rows: usize,
    pub warehouse_rows: usize,
}
