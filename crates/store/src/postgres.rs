use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Bag, BagId, BagItem, BagItemId, BagStatus, FabricSelection, NewBagItem, NewOrder, Order,
    OrderId, OrderItem, OrderItemId, Profile, Result, ShippingAddress, StoreError, UserId,
    store::Store,
};

const BAG_COLUMNS: &str = "id, user_id, tailor_id, status, created_at, updated_at";

const BAG_ITEM_COLUMNS: &str = "id, bag_id, design_id, design_name, price, fabric_id, \
     fabric_price_per_yard, fabric_yards, color, style, tailor_notes, measurement_id, created_at";

const ORDER_COLUMNS: &str = "id, user_id, tailor_id, bag_id, session_id, status, total_cents, \
     shipping_address, created_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, bag_item_id, design_id, design_name, price, \
     fabric_id, fabric_price_per_yard, fabric_yards, color, style, tailor_notes, measurement_id, \
     created_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` with a bounded pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    fn row_to_bag(row: PgRow) -> Result<Bag> {
        Ok(Bag {
            id: BagId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            tailor_id: UserId::from_uuid(row.try_get::<Uuid, _>("tailor_id")?),
            status: row.try_get::<String, _>("status")?.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_fabric(row: &PgRow) -> Result<Option<FabricSelection>> {
        let fabric_id: Option<String> = row.try_get("fabric_id")?;
        Ok(match fabric_id {
            Some(fabric_id) => Some(FabricSelection {
                fabric_id,
                price_per_yard: row.try_get::<Option<Decimal>, _>("fabric_price_per_yard")?,
                yards: row.try_get::<Option<Decimal>, _>("fabric_yards")?,
            }),
            None => None,
        })
    }

    fn row_to_bag_item(row: PgRow) -> Result<BagItem> {
        Ok(BagItem {
            id: BagItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            bag_id: BagId::from_uuid(row.try_get::<Uuid, _>("bag_id")?),
            design_id: row.try_get("design_id")?,
            design_name: row.try_get("design_name")?,
            price: row.try_get("price")?,
            fabric: Self::row_to_fabric(&row)?,
            color: row.try_get("color")?,
            style: row.try_get("style")?,
            tailor_notes: row.try_get("tailor_notes")?,
            measurement_id: row.try_get("measurement_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let address_json: serde_json::Value = row.try_get("shipping_address")?;
        let shipping_address: ShippingAddress = serde_json::from_value(address_json)?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            tailor_id: UserId::from_uuid(row.try_get::<Uuid, _>("tailor_id")?),
            bag_id: BagId::from_uuid(row.try_get::<Uuid, _>("bag_id")?),
            session_id: row.try_get("session_id")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            total_cents: row.try_get("total_cents")?,
            shipping_address,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            bag_item_id: BagItemId::from_uuid(row.try_get::<Uuid, _>("bag_item_id")?),
            design_id: row.try_get("design_id")?,
            design_name: row.try_get("design_name")?,
            price: row.try_get("price")?,
            fabric: Self::row_to_fabric(&row)?,
            color: row.try_get("color")?,
            style: row.try_get("style")?,
            tailor_notes: row.try_get("tailor_notes")?,
            measurement_id: row.try_get("measurement_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_profile(row: PgRow) -> Result<Profile> {
        Ok(Profile {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            role: row.try_get::<String, _>("role")?.parse()?,
        })
    }
}

/// Maps constraint failures to store errors, leaving other errors as database errors.
fn map_write_error(err: sqlx::Error, entity: &'static str, id: String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation()
            && let Some(constraint) = db_err.constraint()
        {
            return StoreError::UniqueViolation {
                constraint: constraint.to_string(),
            };
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound { entity, id };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Store for PostgresStore {
    async fn find_open_bag(&self, user_id: UserId) -> Result<Option<Bag>> {
        let row = sqlx::query(&format!(
            "SELECT {BAG_COLUMNS} FROM bags WHERE user_id = $1 AND status = 'open'"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_bag).transpose()
    }

    async fn create_bag(&self, user_id: UserId, tailor_id: UserId) -> Result<Bag> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO bags (id, user_id, tailor_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, 'open', now(), now())
            RETURNING {BAG_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id.as_uuid())
        .bind(tailor_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "User", user_id.to_string()))?;

        Self::row_to_bag(row)
    }

    async fn get_bag(&self, bag_id: BagId) -> Result<Option<Bag>> {
        let row = sqlx::query(&format!("SELECT {BAG_COLUMNS} FROM bags WHERE id = $1"))
            .bind(bag_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_bag).transpose()
    }

    async fn set_bag_status(&self, bag_id: BagId, status: BagStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bags
            SET status = $2,
                updated_at = CASE WHEN status = $2 THEN updated_at ELSE now() END
            WHERE id = $1
            "#,
        )
        .bind(bag_id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Bag",
                id: bag_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_bag_item(&self, bag_id: BagId, item: NewBagItem) -> Result<BagItem> {
        let (fabric_id, price_per_yard, yards) = match item.fabric {
            Some(f) => (Some(f.fabric_id), f.price_per_yard, f.yards),
            None => (None, None, None),
        };

        // The bag row is share-locked so a concurrent checkout either waits for
        // this insert or hides the bag from it.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO bag_items (id, bag_id, design_id, design_name, price, fabric_id,
                fabric_price_per_yard, fabric_yards, color, style, tailor_notes, measurement_id,
                created_at)
            SELECT $1, b.id, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now()
            FROM bags b
            WHERE b.id = $2 AND b.status = 'open'
            FOR SHARE
            RETURNING {BAG_ITEM_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(bag_id.as_uuid())
        .bind(&item.design_id)
        .bind(&item.design_name)
        .bind(item.price)
        .bind(fabric_id)
        .bind(price_per_yard)
        .bind(yards)
        .bind(&item.color)
        .bind(&item.style)
        .bind(&item.tailor_notes)
        .bind(&item.measurement_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Bag", bag_id.to_string()))?
        .ok_or_else(|| StoreError::NotFound {
            entity: "Bag",
            id: bag_id.to_string(),
        })?;

        Self::row_to_bag_item(row)
    }

    async fn list_bag_items(&self, bag_id: BagId) -> Result<Vec<BagItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {BAG_ITEM_COLUMNS} FROM bag_items WHERE bag_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(bag_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_bag_item).collect()
    }

    async fn delete_bag_item(&self, bag_id: BagId, item_id: BagItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bag_items WHERE id = $1 AND bag_id = $2")
            .bind(item_id.as_uuid())
            .bind(bag_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let address_json = serde_json::to_value(&order.shipping_address)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (id, user_id, tailor_id, bag_id, session_id, status, total_cents,
                shipping_address, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, now())
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(order.user_id.as_uuid())
        .bind(order.tailor_id.as_uuid())
        .bind(order.bag_id.as_uuid())
        .bind(&order.session_id)
        .bind(order.total_cents)
        .bind(address_json)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Bag", order.bag_id.to_string()))?;

        Self::row_to_order(row)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_bag(&self, bag_id: BagId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE bag_id = $1"
        ))
        .bind(bag_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn insert_order_items(&self, order_id: OrderId, items: &[BagItem]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for item in items {
            let (fabric_id, price_per_yard, yards) = match &item.fabric {
                Some(f) => (Some(f.fabric_id.as_str()), f.price_per_yard, f.yards),
                None => (None, None, None),
            };

            let result = sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, bag_item_id, design_id, design_name, price,
                    fabric_id, fabric_price_per_yard, fabric_yards, color, style, tailor_notes,
                    measurement_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
                ON CONFLICT ON CONSTRAINT order_items_order_id_bag_item_id_key DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id.as_uuid())
            .bind(item.id.as_uuid())
            .bind(&item.design_id)
            .bind(&item.design_name)
            .bind(item.price)
            .bind(fabric_id)
            .bind(price_per_yard)
            .bind(yards)
            .bind(&item.color)
            .bind(&item.style)
            .bind(&item.tailor_notes)
            .bind(&item.measurement_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, "Order", order_id.to_string()))?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order_item).collect()
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT id, full_name, email, role FROM profiles WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_profile).transpose()
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, full_name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                role = EXCLUDED.role
            "#,
        )
        .bind(profile.id.as_uuid())
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(profile.role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
