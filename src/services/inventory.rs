//! Stock levels, manual adjustments and CSV round trips.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Adjustment, InventoryChangeKind, InventoryLog, Product, StockStatus};
use crate::error::{EcommerceError, Result};
use crate::services::customers::finish_csv;
use crate::services::events::EventPublisher;
use crate::store::{Page, Store};

pub const HISTORY_LIMIT: usize = 50;

string_enum! {
    pub enum StockFilter {
        All => "all",
        Low => "low",
        Out => "out",
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    pub stock: Option<StockFilter>,
    pub q: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// `{"type": "set" | "add" | "subtract", "quantity": n}`
    pub adjustment: Adjustment,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustResult {
    pub product_id: Uuid,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub stock_status: StockStatus,
    /// The subtraction asked for more than was on hand.
    pub clamped: bool,
}

#[derive(Debug, Serialize)]
pub struct StockRow {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub stock_status: StockStatus,
}

impl From<&Product> for StockRow {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            sku: p.sku.as_str().to_string(),
            name: p.name.clone(),
            stock_quantity: p.stock_quantity,
            low_stock_threshold: p.low_stock_threshold,
            stock_status: p.stock_status(),
        }
    }
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ImportReport {
    pub updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImportRow {
    sku: String,
    stock: String,
}

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
    events: EventPublisher,
    low_stock_threshold: i32,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher, low_stock_threshold: i32) -> Self {
        Self { store, events, low_stock_threshold }
    }

    #[instrument(skip(self, request), fields(adjustment = ?request.adjustment))]
    pub async fn adjust(&self, product_id: Uuid, request: AdjustRequest, user: Option<String>) -> Result<AdjustResult> {
        request.adjustment.validate()?;
        let reason = request.reason.filter(|r| !r.trim().is_empty());
        let (change, clamped) = self
            .store
            .adjust_stock(product_id, request.adjustment, request.adjustment.kind(), reason, user)
            .await?;
        if clamped {
            warn!(product_id = %product_id, "subtraction exceeded stock, clamped at zero");
        }
        info!(product_id = %product_id, previous = change.previous, current = change.current, "stock adjusted");
        self.events.stock_changes(&[change]).await;
        Ok(AdjustResult {
            product_id,
            previous_stock: change.previous,
            new_stock: change.current,
            stock_status: StockStatus::for_quantity(change.current, change.threshold),
            clamped,
        })
    }

    pub async fn list(&self, query: &InventoryQuery) -> Result<Page<StockRow>> {
        let needle = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()).map(str::to_lowercase);
        let rows: Vec<StockRow> = self
            .store
            .list_products()
            .await?
            .iter()
            .filter(|p| match query.stock.unwrap_or(StockFilter::All) {
                StockFilter::All => true,
                StockFilter::Low => p.stock_quantity > 0 && p.stock_quantity <= p.low_stock_threshold,
                StockFilter::Out => p.stock_quantity <= 0,
            })
            .filter(|p| {
                needle.as_deref().map_or(true, |q| {
                    p.name.to_lowercase().contains(q) || p.sku.as_str().to_lowercase().contains(q)
                })
            })
            .map(StockRow::from)
            .collect();
        Ok(Page::slice(rows, query.page.unwrap_or(1), 20))
    }

    /// Products with `0 < stock <= threshold`, lowest stock first. Without an explicit
    /// threshold each product's own is used.
    pub async fn low_stock(&self, threshold: Option<i32>) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| p.active)
            .filter(|p| p.stock_quantity > 0 && p.stock_quantity <= threshold.unwrap_or(p.low_stock_threshold))
            .collect();
        products.sort_by_key(|p| p.stock_quantity);
        Ok(products)
    }

    pub fn default_threshold(&self) -> i32 {
        self.low_stock_threshold
    }

    pub async fn out_of_stock(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| p.active && p.stock_quantity <= 0)
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    pub async fn history(&self, product_id: Uuid, limit: Option<usize>) -> Result<Vec<InventoryLog>> {
        self.store.get_product(product_id).await?.ok_or(EcommerceError::ProductNotFound)?;
        self.store.inventory_logs(product_id, limit.unwrap_or(HISTORY_LIMIT).max(1)).await
    }

    /// Unknown or inactive products are reported unavailable.
    pub async fn check_availability(&self, wanted: &HashMap<Uuid, u32>) -> Result<HashMap<Uuid, bool>> {
        let mut result = HashMap::with_capacity(wanted.len());
        for (&id, &quantity) in wanted {
            let available = self
                .store
                .get_product(id)
                .await?
                .is_some_and(|p| p.is_visible() && p.has_stock_for(quantity));
            result.insert(id, available);
        }
        Ok(result)
    }

    pub async fn export_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["sku", "name", "stock", "status"])?;
        for product in self.store.list_products().await? {
            writer.write_record([
                product.sku.as_str(),
                product.name.as_str(),
                &product.stock_quantity.to_string(),
                product.stock_status().as_str(),
            ])?;
        }
        finish_csv(writer)
    }

    /// Sets stock per SKU from a `sku,stock` CSV. Bad rows are reported, not fatal.
    #[instrument(skip(self, data))]
    pub async fn import_csv(&self, data: &[u8], user: Option<String>) -> Result<ImportReport> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(data);
        let headers = reader.headers()?.clone();
        if !(headers.iter().any(|h| h == "sku") && headers.iter().any(|h| h == "stock")) {
            return Err(EcommerceError::Validation("csv must have sku and stock columns".into()));
        }

        let mut report = ImportReport::default();
        for (index, row) in reader.deserialize::<ImportRow>().enumerate() {
            let line = index + 2;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    report.errors.push(format!("line {line}: {e}"));
                    continue;
                }
            };
            let stock = match row.stock.parse::<i32>() {
                Ok(stock) if stock >= 0 => stock,
                _ => {
                    report.errors.push(format!("line {line}: invalid stock '{}'", row.stock));
                    continue;
                }
            };
            let Some(product) = self.store.get_product_by_sku(&row.sku.to_uppercase()).await? else {
                report.errors.push(format!("line {line}: unknown sku '{}'", row.sku));
                continue;
            };
            let (change, _) = self
                .store
                .adjust_stock(
                    product.id,
                    Adjustment::Set(stock),
                    InventoryChangeKind::Import,
                    Some("csv import".into()),
                    user.clone(),
                )
                .await?;
            self.events.stock_changes(&[change]).await;
            report.updated += 1;
        }
        info!(updated = report.updated, errors = report.errors.len(), "inventory import finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEvent;
    use crate::domain::value_objects::Sku;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    async fn setup(stocks: &[(&str, i32)]) -> (InventoryService, EventPublisher, Vec<Product>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut products = vec![];
        for (sku, stock) in stocks {
            let mut product = Product::create(Sku::new(*sku).unwrap(), format!("Produto {sku}"), sku.to_lowercase(), Decimal::new(10, 0));
            product.stock_quantity = *stock;
            store.insert_product(&product).await.unwrap();
            products.push(product);
        }
        let events = EventPublisher::recording();
        (InventoryService::new(store, events.clone(), 5), events, products)
    }

    fn request(adjustment: Adjustment) -> AdjustRequest {
        AdjustRequest { adjustment, reason: Some("recount".into()) }
    }

    #[tokio::test]
    async fn test_adjust_logs_and_publishes() {
        let (inventory, events, products) = setup(&[("A-1", 10)]).await;
        let id = products[0].id;

        let result = inventory.adjust(id, request(Adjustment::Subtract(7)), Some("admin".into())).await.unwrap();
        assert_eq!(result.new_stock, 3);
        assert_eq!(result.stock_status, StockStatus::LowStock);
        assert!(matches!(events.recorded()[0], DomainEvent::StockLow { stock: 3, .. }));

        let result = inventory.adjust(id, request(Adjustment::Subtract(9)), None).await.unwrap();
        assert!(result.clamped);
        assert_eq!(result.new_stock, 0);
        assert!(matches!(events.recorded()[1], DomainEvent::StockDepleted { .. }));

        let history = inventory.history(id, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, InventoryChangeKind::Reduction);
        assert_eq!(history[1].user_id.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_invalid_adjustments_rejected() {
        let (inventory, _, products) = setup(&[("A-1", 10)]).await;
        let err = inventory.adjust(products[0].id, request(Adjustment::Add(0)), None).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Validation(_)));
        let err = inventory.adjust(Uuid::now_v7(), request(Adjustment::Set(1)), None).await.unwrap_err();
        assert!(matches!(err, EcommerceError::ProductNotFound));
    }

    #[tokio::test]
    async fn test_stock_listings() {
        let (inventory, _, _) = setup(&[("A-1", 0), ("B-2", 4), ("C-3", 2), ("D-4", 30)]).await;
        let low = inventory.low_stock(None).await.unwrap();
        assert_eq!(low.iter().map(|p| p.stock_quantity).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(inventory.low_stock(Some(3)).await.unwrap().len(), 1);
        assert_eq!(inventory.out_of_stock().await.unwrap().len(), 1);

        let query = InventoryQuery { stock: Some(StockFilter::Low), q: Some("b-2".into()), page: None };
        assert_eq!(inventory.list(&query).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_bulk_availability() {
        let (inventory, _, products) = setup(&[("A-1", 3)]).await;
        let unknown = Uuid::now_v7();
        let wanted = HashMap::from([(products[0].id, 3), (unknown, 1)]);
        let result = inventory.check_availability(&wanted).await.unwrap();
        assert_eq!(result[&products[0].id], true);
        assert_eq!(result[&unknown], false);

        let wanted = HashMap::from([(products[0].id, 4)]);
        assert_eq!(inventory.check_availability(&wanted).await.unwrap()[&products[0].id], false);
    }

    #[tokio::test]
    async fn test_csv_round_trip() {
        let (inventory, _, products) = setup(&[("A-1", 3), ("B-2", 8)]).await;
        let csv = inventory.export_csv().await.unwrap();
        assert!(csv.starts_with("sku,name,stock,status\n"));
        assert!(csv.contains("A-1,Produto A-1,3,low_stock"));

        let data = b"sku,stock\na-1,12\nB-2,-4\nZ-9,1\nB-2,abc\n";
        let report = inventory.import_csv(data, Some("admin".into())).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.errors.len(), 3);

        let history = inventory.history(products[0].id, Some(1)).await.unwrap();
        assert_eq!(history[0].kind, InventoryChangeKind::Import);
        assert_eq!(history[0].new_stock, 12);
    }

    #[tokio::test]
    async fn test_import_requires_columns() {
        let (inventory, _, _) = setup(&[]).await;
        assert!(inventory.import_csv(b"code,qty\nA,1\n", None).await.is_err());
    }
}
