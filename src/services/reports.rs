//! Back-office dashboard and reports.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, PaymentMethod, Product, Role, StockStatus};
use crate::domain::value_objects::{ItemKind, Money};
use crate::error::{EcommerceError, Result};
use crate::services::customers::finish_csv;
use crate::store::{OrderFilter, Store};

string_enum! {
    pub enum PeriodKind {
        SevenDays => "7days",
        ThirtyDays => "30days",
        NinetyDays => "90days",
        Year => "year",
        Month => "month",
        Custom => "custom",
    }
}

string_enum! {
    pub enum ReportKind {
        Sales => "sales",
        Inventory => "inventory",
        Customers => "customers",
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<PeriodKind>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0).map(|d| d.and_utc()).unwrap_or_default()
}

impl PeriodQuery {
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<Period> {
        let today = now.date_naive();
        let days_ago = |n: i64| start_of(today - Duration::days(n));
        let start = match self.period.unwrap_or(PeriodKind::ThirtyDays) {
            PeriodKind::SevenDays => days_ago(7),
            PeriodKind::ThirtyDays => days_ago(30),
            PeriodKind::NinetyDays => days_ago(90),
            PeriodKind::Year => start_of(today.checked_sub_months(Months::new(12)).unwrap_or(today)),
            PeriodKind::Month => start_of(today.with_day(1).unwrap_or(today)),
            PeriodKind::Custom => {
                let (Some(from), Some(to)) = (self.start_date, self.end_date) else {
                    return Err(EcommerceError::Validation("custom periods need start_date and end_date".into()));
                };
                if to < from {
                    return Err(EcommerceError::Validation("end_date must not be before start_date".into()));
                }
                return Ok(Period { start: start_of(from), end: start_of(to + Duration::days(1)) - Duration::seconds(1) });
            }
        };
        Ok(Period { start, end: now })
    }
}

impl Period {
    /// The equally long period right before this one.
    pub fn previous(&self) -> Period {
        let length = self.end - self.start;
        Period { start: self.start - length, end: self.start }
    }

    fn filter(&self) -> OrderFilter {
        OrderFilter::between(self.start, self.end)
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Serialize)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub period: Period,
    pub total_sales: Decimal,
    pub total_orders: usize,
    pub new_customers: usize,
    pub average_order_value: Decimal,
    pub pending_orders: usize,
    pub top_products: Vec<TopProduct>,
    pub latest_orders: Vec<Order>,
    pub low_stock: Vec<Product>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailySales {
    pub date: NaiveDate,
    pub orders: usize,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CategorySales {
    pub category: String,
    pub quantity: u32,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct MethodSales {
    pub method: PaymentMethod,
    pub orders: usize,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct SalesReport {
    pub period: Period,
    pub total_sales: Decimal,
    pub total_orders: usize,
    pub average_order_value: Decimal,
    pub by_day: Vec<DailySales>,
    pub by_category: Vec<CategorySales>,
    pub by_payment_method: Vec<MethodSales>,
    /// Percent change in sales against the previous period; `None` when that had none.
    pub growth: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct CustomerRevenue {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub orders: usize,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CustomersReport {
    pub period: Period,
    pub new_customers: usize,
    pub top_customers: Vec<CustomerRevenue>,
    /// Percent of ordering customers who ordered more than once.
    pub retention_rate: Decimal,
}

#[derive(Debug, Serialize)]
pub struct InventoryReport {
    pub total_products: usize,
    pub total_units: i64,
    pub stock_value: Decimal,
    pub low_stock: usize,
    pub out_of_stock: usize,
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn Store>,
    low_stock_threshold: i32,
}

impl ReportService {
    pub fn new(store: Arc<dyn Store>, low_stock_threshold: i32) -> Self {
        Self { store, low_stock_threshold }
    }

    async fn orders_in(&self, period: &Period) -> Result<Vec<Order>> {
        self.store.list_orders(&period.filter()).await
    }

    async fn new_customers(&self, period: &Period) -> Result<usize> {
        Ok(self
            .store
            .list_users()
            .await?
            .iter()
            .filter(|u| u.role == Role::Customer && period.contains(u.created_at))
            .count())
    }

    pub async fn dashboard(&self, query: &PeriodQuery) -> Result<Dashboard> {
        let period = query.resolve(Utc::now())?;
        let orders = self.orders_in(&period).await?;
        let revenue: Vec<&Order> = orders.iter().filter(|o| o.status.is_revenue()).collect();
        let total_sales = sum_totals(&revenue);

        let pending = OrderFilter { status: Some(OrderStatus::Pending), ..OrderFilter::default() };
        let pending_orders = self.store.list_orders(&pending).await?.len();

        let mut low_stock: Vec<Product> = self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| p.active && p.stock_quantity > 0 && p.stock_quantity <= self.low_stock_threshold)
            .collect();
        low_stock.sort_by_key(|p| p.stock_quantity);

        Ok(Dashboard {
            period,
            total_sales,
            total_orders: orders.len(),
            new_customers: self.new_customers(&period).await?,
            average_order_value: average(total_sales, orders.len()),
            pending_orders,
            top_products: top_products(&revenue, 5),
            latest_orders: orders.iter().take(5).cloned().collect(),
            low_stock,
        })
    }

    pub async fn sales(&self, query: &PeriodQuery) -> Result<SalesReport> {
        let period = query.resolve(Utc::now())?;
        let orders = self.orders_in(&period).await?;
        let revenue: Vec<&Order> = orders.iter().filter(|o| o.status.is_revenue()).collect();
        let total_sales = sum_totals(&revenue);

        let previous: Decimal = self
            .orders_in(&period.previous())
            .await?
            .iter()
            .filter(|o| o.status.is_revenue())
            .map(|o| o.total)
            .sum();
        let growth = (!previous.is_zero())
            .then(|| ((total_sales - previous) / previous * Decimal::ONE_HUNDRED).round_dp(2));

        Ok(SalesReport {
            period,
            total_sales,
            total_orders: revenue.len(),
            average_order_value: average(total_sales, revenue.len()),
            by_day: by_day(&revenue),
            by_category: self.by_category(&revenue).await?,
            by_payment_method: by_payment_method(&revenue),
            growth,
        })
    }

    async fn by_category(&self, orders: &[&Order]) -> Result<Vec<CategorySales>> {
        let categories: HashMap<Uuid, String> =
            self.store.list_categories().await?.into_iter().map(|c| (c.id, c.name)).collect();
        let mut item_category: HashMap<Uuid, Option<Uuid>> = HashMap::new();
        for product in self.store.list_products().await? {
            item_category.insert(product.id, product.category_id);
        }
        for service in self.store.list_services().await? {
            item_category.insert(service.id, service.category_id);
        }

        let mut totals: BTreeMap<String, (u32, Decimal)> = BTreeMap::new();
        for line in orders.iter().flat_map(|o| &o.items) {
            let name = item_category
                .get(&line.item.id)
                .copied()
                .flatten()
                .and_then(|id| categories.get(&id).cloned())
                .unwrap_or_else(|| "Uncategorized".to_string());
            let entry = totals.entry(name).or_insert((0, Decimal::ZERO));
            entry.0 += line.quantity;
            entry.1 += line.total;
        }
        let mut rows: Vec<CategorySales> = totals
            .into_iter()
            .map(|(category, (quantity, total))| CategorySales { category, quantity, total })
            .collect();
        rows.sort_by(|a, b| b.total.cmp(&a.total));
        Ok(rows)
    }

    pub async fn customers(&self, query: &PeriodQuery) -> Result<CustomersReport> {
        let period = query.resolve(Utc::now())?;
        let orders = self.orders_in(&period).await?;

        let mut per_customer: HashMap<Uuid, CustomerRevenue> = HashMap::new();
        for order in &orders {
            let entry = per_customer.entry(order.user_id).or_insert_with(|| CustomerRevenue {
                user_id: order.user_id,
                name: order.customer_name.clone(),
                email: order.customer_email.clone(),
                orders: 0,
                total: Decimal::ZERO,
            });
            entry.orders += 1;
            if order.status.is_revenue() {
                entry.total += order.total;
            }
        }

        let ordering = per_customer.len();
        let returning = per_customer.values().filter(|c| c.orders > 1).count();
        let retention_rate = if ordering == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(returning) / Decimal::from(ordering) * Decimal::ONE_HUNDRED).round_dp(2)
        };

        let mut top_customers: Vec<CustomerRevenue> = per_customer.into_values().filter(|c| !c.total.is_zero()).collect();
        top_customers.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
        top_customers.truncate(10);

        Ok(CustomersReport {
            period,
            new_customers: self.new_customers(&period).await?,
            top_customers,
            retention_rate,
        })
    }

    pub async fn inventory(&self) -> Result<InventoryReport> {
        let products = self.store.list_products().await?;
        Ok(InventoryReport {
            total_products: products.len(),
            total_units: products.iter().map(|p| i64::from(p.stock_quantity.max(0))).sum(),
            stock_value: products
                .iter()
                .map(|p| p.price * Decimal::from(p.stock_quantity.max(0)))
                .sum(),
            low_stock: products.iter().filter(|p| p.stock_status() == StockStatus::LowStock).count(),
            out_of_stock: products.iter().filter(|p| p.stock_status() == StockStatus::OutOfStock).count(),
        })
    }

    /// Returns the suggested file name and the CSV body.
    pub async fn export(&self, kind: ReportKind, query: &PeriodQuery) -> Result<(String, String)> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let name = match kind {
            ReportKind::Sales => {
                let period = query.resolve(Utc::now())?;
                let orders = self.orders_in(&period).await?;
                let revenue: Vec<&Order> = orders.iter().filter(|o| o.status.is_revenue()).collect();
                writer.write_record(["date", "orders", "total"])?;
                for day in by_day(&revenue) {
                    writer.write_record([
                        day.date.format("%Y-%m-%d").to_string(),
                        day.orders.to_string(),
                        Money::brl(day.total).format(),
                    ])?;
                }
                format!("sales-{}-to-{}.csv", period.start.format("%Y-%m-%d"), period.end.format("%Y-%m-%d"))
            }
            ReportKind::Inventory => {
                writer.write_record(["sku", "name", "price", "stock", "status", "stock_value"])?;
                for p in self.store.list_products().await? {
                    writer.write_record([
                        p.sku.as_str().to_string(),
                        p.name.clone(),
                        Money::brl(p.price).format(),
                        p.stock_quantity.to_string(),
                        p.stock_status().label().to_string(),
                        Money::brl(p.price * Decimal::from(p.stock_quantity.max(0))).format(),
                    ])?;
                }
                format!("inventory-{}.csv", Utc::now().format("%Y-%m-%d"))
            }
            ReportKind::Customers => {
                let report = self.customers(query).await?;
                writer.write_record(["name", "email", "orders", "total"])?;
                for c in &report.top_customers {
                    writer.write_record([c.name.clone(), c.email.clone(), c.orders.to_string(), Money::brl(c.total).format()])?;
                }
                format!(
                    "customers-{}-to-{}.csv",
                    report.period.start.format("%Y-%m-%d"),
                    report.period.end.format("%Y-%m-%d")
                )
            }
        };
        Ok((name, finish_csv(writer)?))
    }
}

fn sum_totals(orders: &[&Order]) -> Decimal {
    orders.iter().map(|o| o.total).sum()
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        (total / Decimal::from(count)).round_dp(2)
    }
}

fn top_products(orders: &[&Order], limit: usize) -> Vec<TopProduct> {
    let mut totals: HashMap<Uuid, TopProduct> = HashMap::new();
    for line in orders.iter().flat_map(|o| &o.items).filter(|l| l.item.kind == ItemKind::Product) {
        let entry = totals.entry(line.item.id).or_insert_with(|| TopProduct {
            product_id: line.item.id,
            name: line.name.clone(),
            quantity: 0,
            revenue: Decimal::ZERO,
        });
        entry.quantity += line.quantity;
        entry.revenue += line.total;
    }
    let mut top: Vec<TopProduct> = totals.into_values().collect();
    top.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| b.revenue.cmp(&a.revenue)));
    top.truncate(limit);
    top
}

fn by_day(orders: &[&Order]) -> Vec<DailySales> {
    let mut days: BTreeMap<NaiveDate, (usize, Decimal)> = BTreeMap::new();
    for order in orders {
        let entry = days.entry(order.created_at.date_naive()).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += order.total;
    }
    days.into_iter().map(|(date, (orders, total))| DailySales { date, orders, total }).collect()
}

fn by_payment_method(orders: &[&Order]) -> Vec<MethodSales> {
    PaymentMethod::ALL
        .iter()
        .map(|&method| {
            let matching: Vec<&&Order> = orders.iter().filter(|o| o.payment_method == method).collect();
            MethodSales { method, orders: matching.len(), total: matching.iter().map(|o| o.total).sum() }
        })
        .filter(|m| m.orders > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, OrderItem, User};
    use crate::domain::value_objects::{ItemRef, Sku};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_period_resolution() {
        let q = |period| PeriodQuery { period: Some(period), ..PeriodQuery::default() };
        let day = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap();

        assert_eq!(PeriodQuery::default().resolve(now()).unwrap().start, day(2024, 4, 20));
        assert_eq!(q(PeriodKind::SevenDays).resolve(now()).unwrap().start, day(2024, 5, 13));
        assert_eq!(q(PeriodKind::Year).resolve(now()).unwrap().start, day(2023, 5, 20));
        assert_eq!(q(PeriodKind::Month).resolve(now()).unwrap().start, day(2024, 5, 1));

        let custom = PeriodQuery {
            period: Some(PeriodKind::Custom),
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 3),
        };
        let period = custom.resolve(now()).unwrap();
        assert_eq!(period.start, day(2024, 5, 1));
        assert_eq!(period.end, Utc.with_ymd_and_hms(2024, 5, 3, 23, 59, 59).unwrap());
        assert!(q(PeriodKind::Custom).resolve(now()).is_err());

        let previous = period.previous();
        assert_eq!(previous.end, period.start);
        assert_eq!(previous.end - previous.start, period.end - period.start);
    }

    async fn place(store: &Arc<dyn Store>, customer: &User, product: &Product, qty: u32, status: OrderStatus) {
        let line = OrderItem::snapshot(ItemRef::product(product.id), product.name.clone(), None, qty, product.price);
        let mut order = Order::place(customer, Address::default(), PaymentMethod::Pix, vec![line], Decimal::ZERO).unwrap();
        if status != OrderStatus::Pending {
            order.mark_paid().unwrap();
            if status != OrderStatus::Processing {
                order.transition_to(OrderStatus::Canceled).unwrap();
            }
        }
        store.insert_order(&order, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_dashboard_and_customer_report() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ana = User::register("Ana", "ana@example.com", Role::Customer);
        let bia = User::register("Bia", "bia@example.com", Role::Customer);
        store.insert_user(&ana).await.unwrap();
        store.insert_user(&bia).await.unwrap();
        let mut cream = Product::create(Sku::new("CR-1").unwrap(), "Creme", "creme", Decimal::new(100, 0));
        cream.stock_quantity = 3;
        store.insert_product(&cream).await.unwrap();
        let lotion = Product::create(Sku::new("LO-1").unwrap(), "Loção", "locao", Decimal::new(40, 0));
        store.insert_product(&lotion).await.unwrap();

        place(&store, &ana, &cream, 2, OrderStatus::Processing).await;
        place(&store, &ana, &lotion, 3, OrderStatus::Processing).await;
        place(&store, &bia, &cream, 1, OrderStatus::Pending).await;
        place(&store, &bia, &cream, 5, OrderStatus::Canceled).await;

        let reports = ReportService::new(store, 5);
        let dashboard = reports.dashboard(&PeriodQuery::default()).await.unwrap();
        assert_eq!(dashboard.total_sales, Decimal::new(320, 0));
        assert_eq!(dashboard.total_orders, 4);
        assert_eq!(dashboard.average_order_value, Decimal::new(80, 0));
        assert_eq!(dashboard.pending_orders, 1);
        assert_eq!(dashboard.new_customers, 2);
        assert_eq!(dashboard.top_products[0].name, "Loção");
        assert_eq!(dashboard.top_products[0].quantity, 3);
        assert_eq!(dashboard.low_stock.len(), 1);

        let customers = reports.customers(&PeriodQuery::default()).await.unwrap();
        assert_eq!(customers.top_customers.len(), 1);
        assert_eq!(customers.top_customers[0].total, Decimal::new(320, 0));
        assert_eq!(customers.retention_rate, Decimal::new(100, 0));

        let sales = reports.sales(&PeriodQuery::default()).await.unwrap();
        assert_eq!(sales.total_orders, 2);
        assert_eq!(sales.by_category[0].category, "Uncategorized");
        assert_eq!(sales.by_payment_method.len(), 1);
        assert_eq!(sales.growth, None);

        let (name, csv) = reports.export(ReportKind::Inventory, &PeriodQuery::default()).await.unwrap();
        assert!(name.starts_with("inventory-"));
        assert!(csv.starts_with("sku,name,price,stock,status,stock_value"));
    }
}
