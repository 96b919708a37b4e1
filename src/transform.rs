//! Raw API items → typed records.
//!
//! Ordoro embeds per-warehouse stock inside each product, so one product item
//! yields one `ProductRecord` and one `InventoryRecord` per warehouse entry.
//! Flat inventory items (one warehouse per item) are accepted as well.
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::model::{InventoryRecord, ProductRecord, Snapshot};

const TAG_KEYS: [&str; 5] = ["name", "label", "tag", "value", "title"];
const CART_VENDOR_KEYS: [&str; 4] = ["vendor", "channel", "platform", "site"];
const CART_NAME_KEYS: [&str; 3] = ["name", "store", "account"];

fn field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .find(|v| !v.is_null())
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// Integer quantity; rounds fractional values.
pub fn as_quantity(v: Option<&Value>) -> Option<i64> {
    v.and_then(number).map(|f| f.round() as i64)
}

/// Plain number, no rounding (dimensions, weights).
pub fn as_decimal(v: Option<&Value>) -> Option<f64> {
    v.and_then(number)
}

/// Money amount rounded to cents.
pub fn as_money(v: Option<&Value>) -> Option<f64> {
    v.and_then(number).map(|f| (f * 100.0).round() / 100.0)
}

pub fn as_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn as_bool(v: Option<&Value>) -> Option<bool> {
    match v? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse an API timestamp into UTC without zone.
pub fn as_timestamp(v: Option<&Value>) -> Option<NaiveDateTime> {
    let raw = v?.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// `|` separates joined values and `:` separates cart vendor from name, so
/// neither may appear inside a value.
fn safe_text(s: &str) -> String {
    s.replace('|', "/").replace(':', "\u{ff1a}")
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => safe_text(s),
        other => safe_text(&other.to_string()),
    }
}

/// Render a tags value (list of strings or tag objects) as `a|b|c`.
pub fn join_tags(v: Option<&Value>) -> String {
    let tag_text = |t: &Value| -> String {
        match t {
            Value::Object(_) => match field(t, &TAG_KEYS) {
                Some(Value::String(s)) => safe_text(s),
                _ => value_text(t),
            },
            other => value_text(other),
        }
    };
    match v {
        Some(Value::Array(tags)) => tags.iter().map(tag_text).collect::<Vec<_>>().join("|"),
        Some(obj @ Value::Object(_)) => match field(obj, &TAG_KEYS) {
            Some(Value::String(s)) => safe_text(s),
            _ => String::new(),
        },
        Some(Value::String(s)) => safe_text(s),
        _ => String::new(),
    }
}

fn cart_text(cart: &Value) -> String {
    let part = |keys: &[&str]| {
        keys.iter()
            .filter_map(|k| cart.get(*k))
            .find(|v| !v.is_null() && v.as_str() != Some(""))
            .map(value_text)
            .unwrap_or_default()
    };
    let joined = format!("{}:{}", part(&CART_VENDOR_KEYS), part(&CART_NAME_KEYS));
    joined.trim_matches(':').to_string()
}

/// Render the sales channels a product is listed on as `vendor:name|...`.
pub fn join_carts(v: Option<&Value>) -> String {
    match v {
        Some(Value::Array(carts)) => carts
            .iter()
            .map(|c| match c {
                Value::Object(_) => cart_text(c),
                other => value_text(other),
            })
            .collect::<Vec<_>>()
            .join("|"),
        Some(cart @ Value::Object(_)) => cart_text(cart),
        Some(Value::String(s)) => safe_text(s),
        _ => String::new(),
    }
}

pub fn product_from_item(item: &Value) -> Option<ProductRecord> {
    let Some(sku) = as_text(item.get("sku")) else {
        debug!(id = ?item.get("id"), "skipping product without sku");
        return None;
    };
    Some(ProductRecord {
        sku,
        product_id: as_quantity(item.get("id")),
        name: as_text(item.get("name")),
        category: as_text(item.get("category")),
        price: as_money(item.get("price")),
        cost: as_money(item.get("cost")),
        upc: as_text(item.get("upc")),
        asin: as_text(item.get("asin")),
        country_of_origin: as_text(item.get("country_of_origin")),
        tags: join_tags(item.get("tags")),
        carts: join_carts(item.get("carts")),
        total_on_hand: as_quantity(item.get("total_on_hand")),
        total_available: as_quantity(item.get("total_available")),
        total_committed: as_quantity(item.get("total_committed")).unwrap_or(0),
        total_allocated: as_quantity(item.get("total_allocated")).unwrap_or(0),
        total_unallocated: as_quantity(item.get("total_unallocated")).unwrap_or(0),
        total_mfg_ordered: as_quantity(item.get("total_mfg_ordered")).unwrap_or(0),
        to_be_shipped: as_quantity(item.get("to_be_shipped")).unwrap_or(0),
        height: as_decimal(item.get("height")),
        weight: as_decimal(item.get("weight")),
        width: as_decimal(item.get("width")),
        updated: as_timestamp(item.get("updated")),
    })
}

fn warehouse_row(sku: &str, product_id: Option<i64>, w: &Value, flat: bool) -> Option<InventoryRecord> {
    let id_keys: &[&str] = if flat {
        &["warehouse_id", "warehouse"]
    } else {
        &["id", "warehouse_id"]
    };
    let warehouse_id = as_text(field(w, id_keys))?;
    let qty = |keys: &[&str]| as_quantity(field(w, keys)).unwrap_or(0);
    Some(InventoryRecord {
        sku: sku.to_string(),
        warehouse_id,
        product_id,
        warehouse_name: as_text(w.get("warehouse_name")),
        on_hand: qty(&["on_hand", "quantity_on_hand"]),
        physical_on_hand: qty(&["physical_on_hand"]),
        available: qty(&["available", "quantity_available"]),
        committed: qty(&["committed"]),
        allocated: qty(&["allocated"]),
        unallocated: qty(&["unallocated"]),
        mfg_ordered: qty(&["mfg_ordered"]),
        po_committed: qty(&["po_committed"]),
        low_stock_threshold: as_quantity(w.get("low_stock_threshold")),
        out_of_stock_threshold: as_quantity(w.get("out_of_stock_threshold")),
        location: as_text(w.get("location_in_warehouse")),
        is_default_location: as_bool(w.get("is_default_location")),
        is_configured_for_shipping: as_bool(w.get("is_configured_for_shipping")),
        updated: as_timestamp(w.get("updated")),
        warehouse_created: as_timestamp(w.get("warehouse_created_date")),
        warehouse_updated: as_timestamp(w.get("warehouse_updated_date")),
    })
}

pub fn inventory_from_item(item: &Value) -> Vec<InventoryRecord> {
    let Some(sku) = as_text(item.get("sku")) else {
        debug!(id = ?item.get("id"), "skipping inventory item without sku");
        return Vec::new();
    };
    match item.get("warehouses") {
        Some(Value::Array(warehouses)) => {
            let product_id = as_quantity(item.get("id"));
            warehouses
                .iter()
                .filter(|w| w.is_object())
                .filter_map(|w| warehouse_row(&sku, product_id, w, false))
                .collect()
        }
        _ => {
            let product_id = as_quantity(field(item, &["product_id", "id"]));
            warehouse_row(&sku, product_id, item, true).into_iter().collect()
        }
    }
}

/// Keep one record per key: the latest `updated` wins, later wins a tie.
/// Output order follows the first appearance of each key.
fn dedupe_by<T, K, FK>(records: Vec<T>, key: FK, updated: fn(&T) -> Option<NaiveDateTime>) -> Vec<T>
where
    K: std::hash::Hash + Eq,
    FK: Fn(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(records.len());
    for record in records {
        match index.get(&key(&record)) {
            Some(&i) => {
                if updated(&record) >= updated(&out[i]) {
                    out[i] = record;
                }
            }
            None => {
                index.insert(key(&record), out.len());
                out.push(record);
            }
        }
    }
    out
}

pub fn dedupe_inventory(records: Vec<InventoryRecord>) -> Vec<InventoryRecord> {
    dedupe_by(
        records,
        |r| (r.sku.clone(), r.warehouse_id.clone()),
        |r| r.updated,
    )
}

pub fn dedupe_products(records: Vec<ProductRecord>) -> Vec<ProductRecord> {
    dedupe_by(records, |r| r.sku.clone(), |r| r.updated)
}

/// Map both item sets, deduplicate, and fill missing product totals from
/// the warehouse rows of the same SKU.
pub fn build_snapshot(product_items: &[Value], inventory_items: &[Value]) -> Snapshot {
    let products = dedupe_products(product_items.iter().filter_map(product_from_item).collect());
    let inventory = dedupe_inventory(inventory_items.iter().flat_map(inventory_from_item).collect());

    let mut totals: HashMap<&str, (i64, i64)> = HashMap::new();
    for row in &inventory {
        let entry = totals.entry(row.sku.as_str()).or_default();
        entry.0 += row.on_hand;
        entry.1 += row.available;
    }

    let products = products
        .into_iter()
        .map(|mut p| {
            let (on_hand, available) = totals.get(p.sku.as_str()).copied().unwrap_or_default();
            p.total_on_hand = p.total_on_hand.or(Some(on_hand));
            p.total_available = p.total_available.or(Some(available));
            p
        })
        .collect();

    Snapshot {
        products,
        inventory,
    }
}
