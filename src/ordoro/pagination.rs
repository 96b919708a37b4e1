use serde_json::Value;
use tracing::{debug, info, warn};

use super::{extract_items, InventorySource, PageCursor};
use crate::error::{Result, SyncError};

/// Upper bound on requests for one endpoint; a server that never runs dry
/// should fail the run rather than spin forever.
pub const MAX_PAGES: usize = 100_000;

/// Walk every page of `endpoint` and return all items in order.
///
/// Offset paging is tried first. Some deployments ignore `offset` and keep
/// serving the first page; that shows up as a repeated first id, and the
/// walk switches to `page` numbering from where it was. A page shorter than
/// `page_size`, or an empty one, ends the walk.
pub async fn paginate<S>(source: &S, endpoint: &str, page_size: usize) -> Result<Vec<Value>>
where
    S: InventorySource + ?Sized,
{
    let page_size = page_size.max(1);
    let mut items: Vec<Value> = Vec::new();
    let mut cursor = PageCursor::Offset(0);
    let mut last_first_id: Option<Value> = None;

    for _ in 0..MAX_PAGES {
        let body = source.fetch_page(endpoint, cursor, page_size).await?;
        let batch = extract_items(body);
        if batch.is_empty() {
            info!(endpoint, total = items.len(), "no more data, pagination ended");
            return Ok(items);
        }

        let first_id = batch[0].get("id").filter(|id| !id.is_null()).cloned();
        let repeated = first_id.is_some() && first_id == last_first_id;
        match cursor {
            PageCursor::Offset(offset) if repeated => {
                let page = offset / page_size + 1;
                warn!(endpoint, offset, page, "offset ignored by server, switching to page mode");
                cursor = PageCursor::Page(page);
                continue;
            }
            PageCursor::Page(page) if repeated => {
                return Err(SyncError::api(
                    "ordoro",
                    format!("{endpoint} served the same data again at page {page}"),
                ));
            }
            _ => {}
        }

        let len = batch.len();
        debug!(endpoint, ?cursor, len, "fetched page");
        items.extend(batch);

        if len < page_size {
            info!(endpoint, last_page = len, total = items.len(), "final page reached");
            return Ok(items);
        }

        last_first_id = first_id;
        cursor = match cursor {
            PageCursor::Offset(offset) => PageCursor::Offset(offset + len),
            PageCursor::Page(page) => PageCursor::Page(page + 1),
        };
    }

    Err(SyncError::api(
        "ordoro",
        format!("{endpoint} did not finish within {MAX_PAGES} pages"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves `total` items with ids 1..=total.
    struct FakeServer {
        total: usize,
        honors_offset: bool,
        calls: Mutex<Vec<PageCursor>>,
    }

    impl FakeServer {
        fn new(total: usize, honors_offset: bool) -> Self {
            Self {
                total,
                honors_offset,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<PageCursor> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InventorySource for FakeServer {
        async fn authenticate(&self) -> Result<()> {
            Ok(())
        }

        async fn fetch_page(&self, _endpoint: &str, cursor: PageCursor, limit: usize) -> Result<Value> {
            self.calls.lock().unwrap().push(cursor);
            let start = match cursor {
                PageCursor::Offset(o) if self.honors_offset => o,
                PageCursor::Offset(_) => 0,
                PageCursor::Page(p) => (p - 1) * limit,
            };
            let items: Vec<Value> = (start..self.total.min(start + limit))
                .map(|i| json!({"id": i + 1, "sku": format!("SKU-{}", i + 1)}))
                .collect();
            Ok(json!({"count": self.total, "product": items}))
        }
    }

    fn ids(items: &[Value]) -> Vec<u64> {
        items.iter().map(|v| v["id"].as_u64().unwrap()).collect()
    }

    #[tokio::test]
    async fn offset_paging_returns_every_item_once() {
        let server = FakeServer::new(7, true);
        let items = paginate(&server, "product/", 3).await.unwrap();
        assert_eq!(ids(&items), (1..=7).collect::<Vec<_>>());
        assert_eq!(
            server.calls(),
            vec![
                PageCursor::Offset(0),
                PageCursor::Offset(3),
                PageCursor::Offset(6)
            ]
        );
    }

    #[tokio::test]
    async fn exact_multiple_stops_on_empty_page() {
        let server = FakeServer::new(6, true);
        let items = paginate(&server, "product/", 3).await.unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(server.calls().len(), 3);
    }

    #[tokio::test]
    async fn falls_back_to_page_mode() {
        let server = FakeServer::new(7, false);
        let items = paginate(&server, "product/", 3).await.unwrap();
        assert_eq!(ids(&items), (1..=7).collect::<Vec<_>>());
        assert_eq!(
            server.calls(),
            vec![
                PageCursor::Offset(0),
                PageCursor::Offset(3),
                PageCursor::Page(2),
                PageCursor::Page(3)
            ]
        );
    }

    #[tokio::test]
    async fn empty_endpoint() {
        let server = FakeServer::new(0, true);
        assert!(paginate(&server, "product/", 10).await.unwrap().is_empty());
    }

    struct StuckServer;

    #[async_trait]
    impl InventorySource for StuckServer {
        async fn authenticate(&self) -> Result<()> {
            Ok(())
        }

        async fn fetch_page(&self, _endpoint: &str, _cursor: PageCursor, _limit: usize) -> Result<Value> {
            Ok(json!([{"id": 1}, {"id": 2}]))
        }
    }

    #[tokio::test]
    async fn server_ignoring_every_cursor_is_an_error() {
        let err = paginate(&StuckServer, "product/", 2).await.unwrap_err();
        assert!(matches!(err, SyncError::Api { .. }));
    }
}
