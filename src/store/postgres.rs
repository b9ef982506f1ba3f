use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use super::{OrderStore, StoreError};
use crate::models::{Delivery, Item, Order, Payment};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// One order aggregate spans four tables, all keyed by order_uid. Every
// write is a single transaction: either the whole aggregate lands or none
// of it does. Orders mutate by full replacement only, so item rows are
// deleted and re-inserted rather than diffed.
//
// ============================================================================

pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the four aggregate tables when they do not exist yet. This is
    /// first-run bootstrap, not migration tooling: existing tables are left
    /// untouched.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                order_uid          TEXT PRIMARY KEY,
                track_number       TEXT NOT NULL,
                entry              TEXT NOT NULL,
                locale             TEXT NOT NULL,
                internal_signature TEXT NOT NULL DEFAULT '',
                customer_id        TEXT NOT NULL,
                delivery_service   TEXT NOT NULL,
                shardkey           TEXT NOT NULL DEFAULT '',
                sm_id              BIGINT NOT NULL DEFAULT 0,
                date_created       TIMESTAMPTZ NOT NULL,
                oof_shard          TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deliveries (
                order_uid TEXT PRIMARY KEY REFERENCES orders(order_uid) ON DELETE CASCADE,
                name      TEXT NOT NULL,
                phone     TEXT NOT NULL,
                zip       TEXT NOT NULL DEFAULT '',
                city      TEXT NOT NULL,
                address   TEXT NOT NULL,
                region    TEXT NOT NULL DEFAULT '',
                email     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payments (
                order_uid     TEXT PRIMARY KEY REFERENCES orders(order_uid) ON DELETE CASCADE,
                transaction   TEXT NOT NULL,
                request_id    TEXT NOT NULL DEFAULT '',
                currency      TEXT NOT NULL,
                provider      TEXT NOT NULL,
                amount        BIGINT NOT NULL,
                payment_dt    BIGINT NOT NULL,
                bank          TEXT NOT NULL,
                delivery_cost BIGINT NOT NULL,
                goods_total   BIGINT NOT NULL,
                custom_fee    BIGINT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                order_uid    TEXT NOT NULL REFERENCES orders(order_uid) ON DELETE CASCADE,
                position     INT NOT NULL,
                chrt_id      BIGINT NOT NULL,
                track_number TEXT NOT NULL,
                price        BIGINT NOT NULL,
                rid          TEXT NOT NULL,
                name         TEXT NOT NULL,
                sale         BIGINT NOT NULL,
                size         TEXT,
                total_price  BIGINT NOT NULL,
                nm_id        BIGINT NOT NULL,
                brand        TEXT NOT NULL,
                status       INT NOT NULL,
                PRIMARY KEY (order_uid, position)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("order schema ready");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                track_number = EXCLUDED.track_number,
                entry = EXCLUDED.entry,
                locale = EXCLUDED.locale,
                internal_signature = EXCLUDED.internal_signature,
                customer_id = EXCLUDED.customer_id,
                delivery_service = EXCLUDED.delivery_service,
                shardkey = EXCLUDED.shardkey,
                sm_id = EXCLUDED.sm_id,
                date_created = EXCLUDED.date_created,
                oof_shard = EXCLUDED.oof_shard
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                zip = EXCLUDED.zip,
                city = EXCLUDED.city,
                address = EXCLUDED.address,
                region = EXCLUDED.region,
                email = EXCLUDED.email
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                order_uid, transaction, request_id, currency, provider,
                amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                transaction = EXCLUDED.transaction,
                request_id = EXCLUDED.request_id,
                currency = EXCLUDED.currency,
                provider = EXCLUDED.provider,
                amount = EXCLUDED.amount,
                payment_dt = EXCLUDED.payment_dt,
                bank = EXCLUDED.bank,
                delivery_cost = EXCLUDED.delivery_cost,
                goods_total = EXCLUDED.goods_total,
                custom_fee = EXCLUDED.custom_fee
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(&order.payment.currency)
        .bind(&order.payment.provider)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        // Full replacement of the item rows.
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO items (
                    order_uid, position, chrt_id, track_number, price, rid,
                    name, sale, size, total_price, nm_id, brand, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(&order.order_uid)
            .bind(position as i32)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(order_uid = %order.order_uid, "order persisted");
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Order, StoreError> {
        let order_row = sqlx::query(
            r#"
            SELECT order_uid, track_number, entry, locale, internal_signature,
                   customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            FROM orders WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;

        let delivery_row = sqlx::query(
            "SELECT name, phone, zip, city, address, region, email \
             FROM deliveries WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_one(&self.pool)
        .await?;

        let payment_row = sqlx::query(
            "SELECT transaction, request_id, currency, provider, amount, payment_dt, \
                    bank, delivery_cost, goods_total, custom_fee \
             FROM payments WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_one(&self.pool)
        .await?;

        let item_rows = sqlx::query(
            "SELECT chrt_id, track_number, price, rid, name, sale, size, \
                    total_price, nm_id, brand, status \
             FROM items WHERE order_uid = $1 ORDER BY position",
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(item_rows.len());
        for row in item_rows {
            items.push(Item {
                chrt_id: row.try_get("chrt_id")?,
                track_number: row.try_get("track_number")?,
                price: row.try_get("price")?,
                rid: row.try_get("rid")?,
                name: row.try_get("name")?,
                sale: row.try_get("sale")?,
                size: row.try_get("size")?,
                total_price: row.try_get("total_price")?,
                nm_id: row.try_get("nm_id")?,
                brand: row.try_get("brand")?,
                status: row.try_get("status")?,
            });
        }

        Ok(Order {
            order_uid: order_row.try_get("order_uid")?,
            track_number: order_row.try_get("track_number")?,
            entry: order_row.try_get("entry")?,
            delivery: Delivery {
                name: delivery_row.try_get("name")?,
                phone: delivery_row.try_get("phone")?,
                zip: delivery_row.try_get("zip")?,
                city: delivery_row.try_get("city")?,
                address: delivery_row.try_get("address")?,
                region: delivery_row.try_get("region")?,
                email: delivery_row.try_get("email")?,
            },
            payment: Payment {
                transaction: payment_row.try_get("transaction")?,
                request_id: payment_row.try_get("request_id")?,
                currency: payment_row.try_get("currency")?,
                provider: payment_row.try_get("provider")?,
                amount: payment_row.try_get("amount")?,
                payment_dt: payment_row.try_get("payment_dt")?,
                bank: payment_row.try_get("bank")?,
                delivery_cost: payment_row.try_get("delivery_cost")?,
                goods_total: payment_row.try_get("goods_total")?,
                custom_fee: payment_row.try_get("custom_fee")?,
            },
            items,
            locale: order_row.try_get("locale")?,
            internal_signature: order_row.try_get("internal_signature")?,
            customer_id: order_row.try_get("customer_id")?,
            delivery_service: order_row.try_get("delivery_service")?,
            shardkey: order_row.try_get("shardkey")?,
            sm_id: order_row.try_get("sm_id")?,
            date_created: order_row.try_get("date_created")?,
            oof_shard: order_row.try_get("oof_shard")?,
        })
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let uid_rows = sqlx::query(
            "SELECT order_uid FROM orders ORDER BY date_created DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(uid_rows.len());
        for row in uid_rows {
            let order_uid: String = row.try_get("order_uid")?;
            orders.push(self.get_by_id(&order_uid).await?);
        }
        Ok(orders)
    }
}
