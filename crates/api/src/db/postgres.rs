//! `PostgreSQL` store.
//!
//! Queries are checked at runtime and decoded through `FromRow` rows, then
//! converted into core types. Conversions that can fail (unknown role or
//! status text, negative counters) surface as `DataCorruption`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use marketplace_core::catalog::Product;
use marketplace_core::claim::Claim;
use marketplace_core::favorite::Favorite;
use marketplace_core::order::{Order, OrderItem, OrderStatus, stock_demand};
use marketplace_core::review::{Rating, RatingSummary, Review};
use marketplace_core::{ClaimId, Email, Money, OrderId, ProductId, ReviewId, UserId, UserRole};

use super::{MarketplaceStore, RepositoryError, status_conflict};
use crate::models::User;

/// [`MarketplaceStore`] backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    display_name: String,
    role: String,
    phone: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&r.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let role = r
            .role
            .parse::<UserRole>()
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        Ok(Self {
            id: r.id,
            email,
            display_name: r.display_name,
            role,
            phone: r.phone,
            address: r.address,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    seller_id: UserId,
    title: String,
    description: String,
    category: String,
    regular_price: Money,
    sale_price: Money,
    stock: i32,
    colors: Vec<String>,
    sizes: Vec<String>,
    images: Vec<String>,
    sales: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn counter(value: i32, what: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {what}: {value}")))
}

fn to_db_count(value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| {
        RepositoryError::Conflict(format!("quantity {value} exceeds what can be stored"))
    })
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            seller_id: r.seller_id,
            title: r.title,
            description: r.description,
            category: r.category,
            regular_price: r.regular_price,
            sale_price: r.sale_price,
            stock: counter(r.stock, "stock")?,
            colors: r.colors,
            sizes: r.sizes,
            images: r.images,
            sales: counter(r.sales, "sales")?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClaimRow {
    id: ClaimId,
    affiliate_id: UserId,
    product_id: ProductId,
    title: Option<String>,
    description: Option<String>,
    sale_price: Money,
    regular_price: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ClaimRow> for Claim {
    fn from(r: ClaimRow) -> Self {
        Self {
            id: r.id,
            affiliate_id: r.affiliate_id,
            product_id: r.product_id,
            title: r.title,
            description: r.description,
            sale_price: r.sale_price,
            regular_price: r.regular_price,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: ReviewId,
    product_id: ProductId,
    author_id: UserId,
    author_name: String,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(r: ReviewRow) -> Result<Self, Self::Error> {
        let rating = u8::try_from(r.rating)
            .ok()
            .and_then(|stars| Rating::new(stars).ok())
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!("invalid rating: {}", r.rating))
            })?;
        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            author_id: r.author_id,
            author_name: r.author_name,
            rating,
            comment: r.comment,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    buyer_id: UserId,
    total: Money,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: OrderId,
    product_id: ProductId,
    seller_id: UserId,
    affiliate_id: Option<UserId>,
    claim_id: Option<ClaimId>,
    title: String,
    color: Option<String>,
    size: Option<String>,
    quantity: i32,
    unit_price: Money,
    base_unit_price: Money,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(r: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: r.product_id,
            seller_id: r.seller_id,
            affiliate_id: r.affiliate_id,
            claim_id: r.claim_id,
            title: r.title,
            color: r.color,
            size: r.size,
            quantity: counter(r.quantity, "quantity")?,
            unit_price: r.unit_price,
            base_unit_price: r.base_unit_price,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    product_id: ProductId,
    count: i64,
    star_sum: i64,
}

// =============================================================================
// Queries
// =============================================================================

const USER_COLUMNS: &str =
    "id, email, display_name, role, phone, address, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, seller_id, title, description, category, regular_price, \
     sale_price, stock, colors, sizes, images, sales, created_at, updated_at";

const CLAIM_COLUMNS: &str = "id, affiliate_id, product_id, title, description, sale_price, \
     regular_price, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, buyer_id, total, status, created_at, updated_at";

/// Map unique and foreign key violations onto repository errors.
fn map_constraint(e: sqlx::Error, conflict: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict(conflict.to_owned());
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::NotFound;
        }
    }
    RepositoryError::Database(e)
}

const fn expect_one(rows_affected: u64) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

impl PgStore {
    /// Load orders matching `condition` (a clause over `o`, binding `$1`)
    /// together with their items.
    async fn orders_where(&self, condition: &str, id: Uuid) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE {condition} ORDER BY created_at DESC, id"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql).bind(id).fetch_all(&self.pool).await?;
        self.attach_items(rows).await
    }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id.as_uuid()).collect();
        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT order_id, product_id, seller_id, affiliate_id, claim_id, title,
                   color, size, quantity, unit_price, base_unit_price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items
                .entry(order_id)
                .or_default()
                .push(OrderItem::try_from(row)?);
        }

        rows.into_iter()
            .map(|r| {
                let status = r
                    .status
                    .parse::<OrderStatus>()
                    .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
                Ok(Order {
                    items: items.remove(&r.id).unwrap_or_default(),
                    id: r.id,
                    buyer_id: r.buyer_id,
                    total: r.total,
                    status,
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MarketplaceStore for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, user: &User, password_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, password_hash, display_name, role, phone, address,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(user.id)
        .bind(user.email.as_str())
        .bind(password_hash)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "email already exists"))?;
        Ok(())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn user_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
        let row: Option<CredentialsRow> = sqlx::query_as(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Ok((User::try_from(r.user)?, r.password_hash)))
            .transpose()
    }

    async fn update_user(&self, user: &User) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET display_name = $2, phone = $3, address = $4, updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(&user.phone)
        .bind(&user.address)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected())
    }

    async fn products(&self) -> Result<Vec<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id");
        let rows: Vec<ProductRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Product::try_from).transpose()
    }

    async fn insert_product(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO products (id, seller_id, title, description, category, regular_price,
                                  sale_price, stock, colors, sizes, images, sales,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(product.id)
        .bind(product.seller_id)
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.regular_price)
        .bind(product.sale_price)
        .bind(to_db_count(product.stock)?)
        .bind(&product.colors)
        .bind(&product.sizes)
        .bind(&product.images)
        .bind(to_db_count(product.sales)?)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "product already exists"))?;
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE products
            SET title = $2, description = $3, category = $4, regular_price = $5,
                sale_price = $6, stock = $7, colors = $8, sizes = $9, images = $10,
                updated_at = $11
            WHERE id = $1
            ",
        )
        .bind(product.id)
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.regular_price)
        .bind(product.sale_price)
        .bind(to_db_count(product.stock)?)
        .bind(&product.colors)
        .bind(&product.sizes)
        .bind(&product.images)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        // Claims, favorites and reviews go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected())
    }

    async fn insert_claim(&self, claim: &Claim) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO claims (id, affiliate_id, product_id, title, description, sale_price,
                                regular_price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(claim.id)
        .bind(claim.affiliate_id)
        .bind(claim.product_id)
        .bind(&claim.title)
        .bind(&claim.description)
        .bind(claim.sale_price)
        .bind(claim.regular_price)
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "you have already claimed this product"))?;
        Ok(())
    }

    async fn claim(&self, id: ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = $1");
        let row: Option<ClaimRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Claim::from))
    }

    async fn claims_by_ids(&self, ids: &[ClaimId]) -> Result<Vec<Claim>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(ClaimId::as_uuid).collect();
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ANY($1)");
        let rows: Vec<ClaimRow> = sqlx::query_as(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Claim::from).collect())
    }

    async fn claims_by_affiliate(
        &self,
        affiliate_id: UserId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let sql = format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE affiliate_id = $1 \
             ORDER BY created_at DESC, id"
        );
        let rows: Vec<ClaimRow> = sqlx::query_as(&sql)
            .bind(affiliate_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Claim::from).collect())
    }

    async fn update_claim(&self, claim: &Claim) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE claims
            SET title = $2, description = $3, sale_price = $4, regular_price = $5,
                updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(claim.id)
        .bind(&claim.title)
        .bind(&claim.description)
        .bind(claim.sale_price)
        .bind(claim.regular_price)
        .bind(claim.updated_at)
        .execute(&self.pool)
        .await?;
        expect_one(result.rows_affected())
    }

    async fn delete_claim(&self, id: ClaimId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM claims WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_one(result.rows_affected())
    }

    async fn add_favorite(&self, favorite: &Favorite) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO favorites (user_id, product_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO NOTHING
            ",
        )
        .bind(favorite.user_id)
        .bind(favorite.product_id)
        .bind(favorite.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "already a favorite"))?;
        Ok(())
    }

    async fn remove_favorite(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn favorite_product_ids(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProductId>, RepositoryError> {
        let ids: Vec<ProductId> = sqlx::query_scalar(
            "SELECT product_id FROM favorites WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_review(&self, review: &Review) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO reviews (id, product_id, author_id, author_name, rating, comment,
                                 created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(review.id)
        .bind(review.product_id)
        .bind(review.author_id)
        .bind(&review.author_name)
        .bind(i16::from(review.rating.stars()))
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "you have already reviewed this product"))?;
        Ok(())
    }

    async fn reviews_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Review>, RepositoryError> {
        let rows: Vec<ReviewRow> = sqlx::query_as(
            r"
            SELECT id, product_id, author_id, author_name, rating, comment, created_at
            FROM reviews
            WHERE product_id = $1
            ORDER BY created_at DESC, id
            ",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Review::try_from).collect()
    }

    async fn rating_summaries(
        &self,
    ) -> Result<HashMap<ProductId, RatingSummary>, RepositoryError> {
        let rows: Vec<RatingRow> = sqlx::query_as(
            r"
            SELECT product_id, COUNT(*) AS count, SUM(rating)::BIGINT AS star_sum
            FROM reviews
            GROUP BY product_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let count = u32::try_from(r.count).map_err(|_| {
                    RepositoryError::DataCorruption(format!("invalid review count: {}", r.count))
                })?;
                let sum = u64::try_from(r.star_sum).map_err(|_| {
                    RepositoryError::DataCorruption(format!("invalid rating sum: {}", r.star_sum))
                })?;
                Ok((r.product_id, RatingSummary::from_totals(count, sum)))
            })
            .collect()
    }

    async fn place_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Lock rows in id order so concurrent checkouts cannot deadlock.
        let mut demand: Vec<(ProductId, u32)> = stock_demand(&order.items).into_iter().collect();
        demand.sort_unstable_by_key(|(id, _)| *id);

        for (product_id, requested) in demand {
            let requested_db = to_db_count(requested)?;
            let updated = sqlx::query(
                r"
                UPDATE products
                SET stock = stock - $2, sales = sales + $2, updated_at = now()
                WHERE id = $1 AND stock >= $2
                ",
            )
            .bind(product_id)
            .bind(requested_db)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let stock: Option<i32> =
                    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                        .bind(product_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(RepositoryError::OutOfStock {
                    product_id,
                    available: stock.map_or(Ok(0), |s| counter(s, "stock"))?,
                });
            }
        }

        sqlx::query(
            r"
            INSERT INTO orders (id, buyer_id, total, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(order.id)
        .bind(order.buyer_id)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| {
                RepositoryError::Conflict("too many items in one order".to_owned())
            })?;
            sqlx::query(
                r"
                INSERT INTO order_items (order_id, position, product_id, seller_id, affiliate_id,
                                         claim_id, title, color, size, quantity, unit_price,
                                         base_unit_price)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ",
            )
            .bind(order.id)
            .bind(position)
            .bind(item.product_id)
            .bind(item.seller_id)
            .bind(item.affiliate_id)
            .bind(item.claim_id)
            .bind(&item.title)
            .bind(&item.color)
            .bind(&item.size)
            .bind(to_db_count(item.quantity)?)
            .bind(item.unit_price)
            .bind(item.base_unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut orders = self.orders_where("o.id = $1", id.as_uuid()).await?;
        Ok(orders.pop())
    }

    async fn orders_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.orders_where("o.buyer_id = $1", buyer_id.as_uuid())
            .await
    }

    async fn orders_for_seller(&self, seller_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.orders_where(
            "EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.seller_id = $1)",
            seller_id.as_uuid(),
        )
        .await
    }

    async fn orders_for_affiliate(
        &self,
        affiliate_id: UserId,
    ) -> Result<Vec<Order>, RepositoryError> {
        self.orders_where(
            "EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.affiliate_id = $1)",
            affiliate_id.as_uuid(),
        )
        .await
    }

    async fn update_order_status(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?;
        let previous = previous
            .ok_or(RepositoryError::NotFound)?
            .parse::<OrderStatus>()
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        if !previous.can_transition_to(order.status) {
            return Err(status_conflict(previous, order.status));
        }

        if order.status == OrderStatus::Cancelled {
            for (product_id, quantity) in stock_demand(&order.items) {
                // The product may have been deleted since; nothing to return then.
                sqlx::query(
                    r"
                    UPDATE products
                    SET stock = stock + $2, sales = GREATEST(sales - $2, 0), updated_at = now()
                    WHERE id = $1
                    ",
                )
                .bind(product_id)
                .bind(to_db_count(quantity)?)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id)
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
