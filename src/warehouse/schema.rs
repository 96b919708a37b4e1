//! Destination table layouts and the SQL text derived from them.
use chrono::NaiveDateTime;

use crate::model::{InventoryRecord, ProductRecord};

pub const STAGING_SUFFIX: &str = "__STAGING";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Float,
    Boolean,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Snowflake,
    Sqlite,
}

impl ColumnType {
    pub fn sql(self, dialect: Dialect) -> &'static str {
        match (dialect, self) {
            (Dialect::Snowflake, ColumnType::Text) => "VARCHAR",
            (Dialect::Snowflake, ColumnType::Integer) => "NUMBER(38,0)",
            (Dialect::Snowflake, ColumnType::Decimal) => "NUMBER(18,2)",
            (Dialect::Snowflake, ColumnType::Float) => "FLOAT",
            (Dialect::Snowflake, ColumnType::Boolean) => "BOOLEAN",
            (Dialect::Snowflake, ColumnType::Timestamp) => "TIMESTAMP_NTZ",
            (Dialect::Sqlite, ColumnType::Text) => "TEXT",
            (Dialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (Dialect::Sqlite, ColumnType::Decimal | ColumnType::Float) => "REAL",
            (Dialect::Sqlite, ColumnType::Boolean) => "BOOLEAN",
            (Dialect::Sqlite, ColumnType::Timestamp) => "DATETIME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub key: &'static [&'static str],
}

pub static WAREHOUSE_LEVEL: TableSchema = TableSchema {
    name: "INVENTORY_WAREHOUSE_LEVEL",
    columns: &[
        col("SKU", ColumnType::Text),
        col("WAREHOUSE_ID", ColumnType::Text),
        col("PRODUCT_ID", ColumnType::Integer),
        col("WAREHOUSE_NAME", ColumnType::Text),
        col("ON_HAND", ColumnType::Integer),
        col("PHYSICAL_ON_HAND", ColumnType::Integer),
        col("AVAILABLE", ColumnType::Integer),
        col("COMMITTED", ColumnType::Integer),
        col("ALLOCATED", ColumnType::Integer),
        col("UNALLOCATED", ColumnType::Integer),
        col("MFG_ORDERED", ColumnType::Integer),
        col("PO_COMMITTED", ColumnType::Integer),
        col("LOW_STOCK_THRESHOLD", ColumnType::Integer),
        col("OUT_OF_STOCK_THRESHOLD", ColumnType::Integer),
        col("LOCATION", ColumnType::Text),
        col("IS_DEFAULT_LOCATION", ColumnType::Boolean),
        col("IS_CONFIGURED_FOR_SHIPPING", ColumnType::Boolean),
        col("UPDATED", ColumnType::Timestamp),
        col("WAREHOUSE_CREATED", ColumnType::Timestamp),
        col("WAREHOUSE_UPDATED", ColumnType::Timestamp),
    ],
    key: &["SKU", "WAREHOUSE_ID"],
};

pub static PRODUCT_LEVEL: TableSchema = TableSchema {
    name: "INVENTORY_PRODUCT_LEVEL",
    columns: &[
        col("SKU", ColumnType::Text),
        col("PRODUCT_ID", ColumnType::Integer),
        col("NAME", ColumnType::Text),
        col("CATEGORY", ColumnType::Text),
        col("PRICE", ColumnType::Decimal),
        col("COST", ColumnType::Decimal),
        col("UPC", ColumnType::Text),
        col("ASIN", ColumnType::Text),
        col("COUNTRY", ColumnType::Text),
        col("TAGS", ColumnType::Text),
        col("CARTS", ColumnType::Text),
        col("TOTAL_ON_HAND", ColumnType::Integer),
        col("TOTAL_AVAILABLE", ColumnType::Integer),
        col("TOTAL_COMMITTED", ColumnType::Integer),
        col("TOTAL_ALLOCATED", ColumnType::Integer),
        col("TOTAL_UNALLOCATED", ColumnType::Integer),
        col("TOTAL_MFG_ORDERED", ColumnType::Integer),
        col("TO_BE_SHIPPED", ColumnType::Integer),
        col("HEIGHT", ColumnType::Float),
        col("WEIGHT", ColumnType::Float),
        col("WIDTH", ColumnType::Float),
        col("UPDATED", ColumnType::Timestamp),
    ],
    key: &["SKU"],
};

impl TableSchema {
    pub fn staging_name(&self) -> String {
        format!("{}{}", self.name, STAGING_SUFFIX)
    }

    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column definitions plus primary key, without the `CREATE ...` prefix.
    pub fn definition(&self, dialect: Dialect) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let not_null = if self.key.contains(&c.name) { " NOT NULL" } else { "" };
                format!("{} {}{}", c.name, c.ty.sql(dialect), not_null)
            })
            .collect();
        parts.push(format!("PRIMARY KEY ({})", self.key.join(", ")));
        format!("({})", parts.join(", "))
    }

    /// `INSERT` with `rows` placeholder tuples.
    pub fn insert_sql(&self, table: &str, rows: usize) -> String {
        let tuple = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![tuple; rows.max(1)].join(", ");
        format!("INSERT INTO {} ({}) VALUES {}", table, self.column_list(), values)
    }
}

/// One value bound into a destination column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Decimal(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

pub type Row = Vec<Cell>;

impl From<Option<String>> for Cell {
    fn from(v: Option<String>) -> Self {
        v.map(Cell::Text).unwrap_or(Cell::Null)
    }
}

impl From<Option<i64>> for Cell {
    fn from(v: Option<i64>) -> Self {
        v.map(Cell::Int).unwrap_or(Cell::Null)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map(Cell::Decimal).unwrap_or(Cell::Null)
    }
}

impl From<Option<bool>> for Cell {
    fn from(v: Option<bool>) -> Self {
        v.map(Cell::Bool).unwrap_or(Cell::Null)
    }
}

impl From<Option<NaiveDateTime>> for Cell {
    fn from(v: Option<NaiveDateTime>) -> Self {
        v.map(Cell::Timestamp).unwrap_or(Cell::Null)
    }
}

/// A record that maps onto one row of a destination table.
pub trait TableRow {
    fn schema() -> &'static TableSchema;
    /// Cells in `schema().columns` order.
    fn to_row(&self) -> Row;
}

impl TableRow for InventoryRecord {
    fn schema() -> &'static TableSchema {
        &WAREHOUSE_LEVEL
    }

    fn to_row(&self) -> Row {
        vec![
            Cell::Text(self.sku.clone()),
            Cell::Text(self.warehouse_id.clone()),
            self.product_id.into(),
            self.warehouse_name.clone().into(),
            Cell::Int(self.on_hand),
            Cell::Int(self.physical_on_hand),
            Cell::Int(self.available),
            Cell::Int(self.committed),
            Cell::Int(self.allocated),
            Cell::Int(self.unallocated),
            Cell::Int(self.mfg_ordered),
            Cell::Int(self.po_committed),
            self.low_stock_threshold.into(),
            self.out_of_stock_threshold.into(),
            self.location.clone().into(),
            self.is_default_location.into(),
            self.is_configured_for_shipping.into(),
            self.updated.into(),
            self.warehouse_created.into(),
            self.warehouse_updated.into(),
        ]
    }
}

impl TableRow for ProductRecord {
    fn schema() -> &'static TableSchema {
        &PRODUCT_LEVEL
    }

    fn to_row(&self) -> Row {
        vec![
            Cell::Text(self.sku.clone()),
            self.product_id.into(),
            self.name.clone().into(),
            self.category.clone().into(),
            self.price.into(),
            self.cost.into(),
            self.upc.clone().into(),
            self.asin.clone().into(),
            self.country_of_origin.clone().into(),
            Cell::Text(self.tags.clone()),
            Cell::Text(self.carts.clone()),
            self.total_on_hand.into(),
            self.total_available.into(),
            Cell::Int(self.total_committed),
            Cell::Int(self.total_allocated),
            Cell::Int(self.total_unallocated),
            Cell::Int(self.total_mfg_ordered),
            Cell::Int(self.to_be_shipped),
            self.height.into(),
            self.weight.into(),
            self.width.into(),
            self.updated.into(),
        ]
    }
}

pub fn rows_of<T: TableRow>(records: &[T]) -> Vec<Row> {
    records.iter().map(TableRow::to_row).collect()
}
