use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_order::compensation::CompensationRecord;
use shop_order::{
    CounterKind, Order, OrderError, OrderFilter, OrderLine, OrderRepository, OrderResult, OrderStatus,
    Page, PageRequest, Payment, PaymentFilter, PaymentStatus, PaymentStatusStats,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

const ORDER_COLUMNS: &str = r#"
    SELECT o.id, o.user_id, o.address_id, o.status, o.created_at, o.updated_at,
           p.id AS payment_id, p.user_id AS payment_user_id, p.sum AS payment_sum,
           p.status AS payment_status, p.created_at AS payment_created_at,
           p.updated_at AS payment_updated_at
    FROM orders o
    JOIN payments p ON p.id = o.payment_id
"#;

const PAYMENT_COLUMNS: &str = r#"
    SELECT p.id, p.user_id, p.sum, p.status, p.created_at, p.updated_at
    FROM payments p
"#;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_ids: &[Uuid]) -> OrderResult<HashMap<Uuid, Vec<OrderLine>>> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<LineRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, amount FROM orders_products WHERE order_id = ANY($1)",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            lines.entry(row.order_id).or_default().push(OrderLine {
                id: row.id,
                order_id: row.order_id,
                product_id: row.product_id,
                amount: row.amount,
            });
        }
        Ok(lines)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> OrderResult<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines = self.load_lines(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let order_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_order(order_lines)
            })
            .collect()
    }

    async fn fetch_one_order(&self, mut qb: QueryBuilder<'_, Postgres>) -> OrderResult<Option<Order>> {
        let row: Option<OrderRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    address_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    payment_id: Uuid,
    payment_user_id: Uuid,
    payment_sum: i64,
    payment_status: String,
    payment_created_at: DateTime<Utc>,
    payment_updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> OrderResult<Order> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            address_id: self.address_id,
            status: OrderStatus::from_str(&self.status).map_err(OrderError::storage)?,
            lines,
            payment: Payment {
                id: self.payment_id,
                user_id: self.payment_user_id,
                sum: self.payment_sum,
                status: PaymentStatus::from_str(&self.payment_status).map_err(OrderError::storage)?,
                created_at: self.payment_created_at,
                updated_at: self.payment_updated_at,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: Uuid,
    sum: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = OrderError;

    fn try_from(row: PaymentRow) -> OrderResult<Self> {
        Ok(Payment {
            id: row.id,
            user_id: row.user_id,
            sum: row.sum,
            status: PaymentStatus::from_str(&row.status).map_err(OrderError::storage)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    amount: i32,
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    status: String,
    count: i64,
    total: i64,
}

fn db_error(e: sqlx::Error) -> OrderError {
    tracing::error!("Database error: {}", e);
    OrderError::storage(e)
}

fn push_order_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND o.user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND o.status = ").push_bind(status.as_str());
    }
    match filter.counter {
        Some(CounterKind::Active) => {
            qb.push(" AND o.status <> 'RECEIVED'");
        }
        Some(CounterKind::Completed) => {
            qb.push(" AND o.status = 'RECEIVED'");
        }
        None => {}
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND o.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND o.created_at < ").push_bind(to);
    }
}

fn push_payment_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PaymentFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND p.user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND p.status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND p.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND p.created_at < ").push_bind(to);
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, order_by: &str, page: PageRequest) {
    qb.push(" ORDER BY ")
        .push(order_by)
        .push(" DESC LIMIT ")
        .push_bind(i64::from(page.size))
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

// ============================================================================
// Repository
// ============================================================================

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, order: &Order) -> OrderResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, user_id, sum, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.payment.id)
        .bind(order.payment.user_id)
        .bind(order.payment.sum)
        .bind(order.payment.status.as_str())
        .bind(order.payment.created_at)
        .bind(order.payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, address_id, status, payment_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.address_id)
        .bind(order.status.as_str())
        .bind(order.payment.id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if !order.lines.is_empty() {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO orders_products (id, order_id, product_id, amount) ");
            qb.push_values(&order.lines, |mut b, line| {
                b.push_bind(line.id)
                    .push_bind(line.order_id)
                    .push_bind(line.product_id)
                    .push_bind(line.amount);
            });
            qb.build().execute(&mut *tx).await.map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn find_order(&self, id: Uuid) -> OrderResult<Option<Order>> {
        let mut qb = QueryBuilder::new(ORDER_COLUMNS);
        qb.push(" WHERE o.id = ").push_bind(id);
        self.fetch_one_order(qb).await
    }

    async fn find_payment(&self, payment_id: Uuid, user_id: Uuid) -> OrderResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(
            "SELECT id, user_id, sum, status, created_at, updated_at FROM payments WHERE id = $1 AND user_id = $2",
        )
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_order_by_payment(
        &self,
        payment_id: Uuid,
        user_id: Uuid,
    ) -> OrderResult<Option<Order>> {
        let mut qb = QueryBuilder::new(ORDER_COLUMNS);
        qb.push(" WHERE o.payment_id = ")
            .push_bind(payment_id)
            .push(" AND o.user_id = ")
            .push_bind(user_id);
        self.fetch_one_order(qb).await
    }

    async fn save_order(&self, order: &Order) -> OrderResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id)
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.payment.id)
            .bind(order.payment.status.as_str())
            .bind(order.payment.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn save_settlement(&self, order: &Order, payment: &Payment) -> OrderResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // order first, cascading its payment
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id)
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.payment.id)
            .bind(order.payment.status.as_str())
            .bind(order.payment.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        // then the payment itself
        sqlx::query("UPDATE payments SET sum = $2, status = $3, updated_at = $4 WHERE id = $1")
            .bind(payment.id)
            .bind(payment.sum)
            .bind(payment.status.as_str())
            .bind(payment.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> OrderResult<Page<Order>> {
        let total = self.count_orders(filter).await?;

        let mut qb = QueryBuilder::new(ORDER_COLUMNS);
        push_order_filter(&mut qb, filter);
        push_page(&mut qb, "o.created_at", page);
        let rows: Vec<OrderRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(Page {
            items: self.hydrate(rows).await?,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn count_orders(&self, filter: &OrderFilter) -> OrderResult<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM orders o");
        push_order_filter(&mut qb, filter);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> OrderResult<Page<Payment>> {
        let total = self.count_payments(filter).await?;

        let mut qb = QueryBuilder::new(PAYMENT_COLUMNS);
        push_payment_filter(&mut qb, filter);
        push_page(&mut qb, "p.created_at", page);
        let rows: Vec<PaymentRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(Page {
            items: rows.into_iter().map(Payment::try_from).collect::<OrderResult<_>>()?,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn count_payments(&self, filter: &PaymentFilter) -> OrderResult<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM payments p");
        push_payment_filter(&mut qb, filter);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    async fn payment_user_stats(&self, user_id: Uuid) -> OrderResult<Vec<PaymentStatusStats>> {
        let rows: Vec<StatsRow> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(sum), 0)::BIGINT AS total
            FROM payments
            WHERE user_id = $1
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(PaymentStatusStats {
                    status: PaymentStatus::from_str(&row.status).map_err(OrderError::storage)?,
                    count: row.count.max(0) as u64,
                    sum: row.total,
                })
            })
            .collect()
    }

    async fn record_compensation(&self, record: &CompensationRecord) -> OrderResult<()> {
        sqlx::query(
            r#"
            INSERT INTO creation_compensations
                (id, user_id, returned_quantities, restored_balances, lost_basket_ids, outcome, reason, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(Json(&record.quantities))
        .bind(record.restore.as_ref().map(Json))
        .bind(&record.lost_basket_ids[..])
        .bind(record.outcome.as_str())
        .bind(&record.reason)
        .bind(record.error.as_deref())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
