//! PostgreSQL user store.
//!
//! Uniqueness is enforced by the `users_username_key` / `users_email_key`
//! constraints; unique violations are mapped back to the offending field.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use uuid::Uuid;

use super::store::UserStore;
use super::{Field, UserError};
use crate::models::ids::{AddressId, OrderId, ProductId, UserId};
use crate::models::user::{ProfileUpdate, User, VerificationMethod};

/// Embedded migrations from `kart_core/migrations/`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const COLUMNS: &str = "id, username, verification_method, email, full_name, avatar, \
     password_hash, phone, shipping_address, billing_address, orders, wishlist, \
     otp, otp_expires, is_verified, refresh_token, created_at, updated_at";

/// Row shape of the `users` table.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    verification_method: String,
    email: String,
    full_name: String,
    avatar: Option<String>,
    password_hash: String,
    phone: Option<String>,
    shipping_address: Option<Uuid>,
    billing_address: Option<Uuid>,
    orders: Vec<Uuid>,
    wishlist: Vec<Uuid>,
    otp: Option<i32>,
    otp_expires: Option<DateTime<Utc>>,
    is_verified: bool,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = UserError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let verification_method: VerificationMethod = row
            .verification_method
            .parse()
            .map_err(|e| UserError::Persistence(sqlx::Error::Decode(Box::new(e))))?;
        Ok(User {
            id: UserId::from_uuid(row.id),
            username: row.username,
            verification_method,
            email: row.email,
            full_name: row.full_name,
            avatar: row.avatar,
            password_hash: row.password_hash,
            phone: row.phone,
            shipping_address: row.shipping_address.map(AddressId::from_uuid),
            billing_address: row.billing_address.map(AddressId::from_uuid),
            orders: row.orders.into_iter().map(OrderId::from_uuid).collect(),
            wishlist: row.wishlist.into_iter().map(ProductId::from_uuid).collect(),
            otp: row.otp.and_then(|v| u32::try_from(v).ok()),
            otp_expires: row.otp_expires,
            is_verified: row.is_verified,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Map a unique violation to a `Duplicate` validation error.
fn map_write_error(e: sqlx::Error, user: &User) -> UserError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        match db.constraint() {
            Some("users_username_key") => return UserError::duplicate(Field::Username, &user.username),
            Some("users_email_key") => return UserError::duplicate(Field::Email, &user.email),
            _ => {}
        }
    }
    UserError::Persistence(e)
}

fn otp_column(otp: Option<u32>) -> Option<i32> {
    otp.and_then(|v| i32::try_from(v).ok())
}

fn found(id: UserId, row: Option<UserRow>) -> Result<User, UserError> {
    row.ok_or_else(|| UserError::NotFound(format!("user {id}")))?
        .try_into()
}

fn affected(id: UserId, rows: u64) -> Result<(), UserError> {
    if rows == 0 {
        return Err(UserError::NotFound(format!("user {id}")));
    }
    Ok(())
}

/// A [`UserStore`] backed by the `users` table.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create or upgrade the `users` table.
    pub async fn migrate(&self) -> Result<(), MigrateError> {
        MIGRATOR.run(&self.pool).await
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, UserError> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    /// Append `value` to a `uuid[]` column unless it is already present.
    async fn append_unique(&self, column: &str, id: UserId, value: Uuid) -> Result<User, UserError> {
        let sql = format!(
            "UPDATE users SET \
               {column} = CASE WHEN $2 = ANY({column}) THEN {column} \
                          ELSE array_append({column}, $2) END, \
               updated_at = CASE WHEN $2 = ANY({column}) THEN updated_at ELSE now() END \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_uuid())
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        found(id, row)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> Result<User, UserError> {
        let sql = format!(
            "INSERT INTO users ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id.as_uuid())
            .bind(&user.username)
            .bind(user.verification_method.as_str())
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(&user.avatar)
            .bind(&user.password_hash)
            .bind(&user.phone)
            .bind(user.shipping_address.map(|a| a.as_uuid()))
            .bind(user.billing_address.map(|a| a.as_uuid()))
            .bind(user.orders.iter().map(OrderId::as_uuid).collect::<Vec<_>>())
            .bind(user.wishlist.iter().map(ProductId::as_uuid).collect::<Vec<_>>())
            .bind(otp_column(user.otp))
            .bind(user.otp_expires)
            .bind(user.is_verified)
            .bind(&user.refresh_token)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, user))?;
        User::try_from(row)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserError> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        self.find_one("email", email).await
    }

    async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<User, UserError> {
        let sql = format!(
            "UPDATE users SET \
               full_name = COALESCE($2, full_name), \
               verification_method = COALESCE($3, verification_method), \
               avatar = CASE WHEN $4 THEN $5 ELSE avatar END, \
               phone = CASE WHEN $6 THEN $7 ELSE phone END, \
               shipping_address = CASE WHEN $8 THEN $9 ELSE shipping_address END, \
               billing_address = CASE WHEN $10 THEN $11 ELSE billing_address END, \
               updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_uuid())
            .bind(&update.full_name)
            .bind(update.verification_method.map(|m| m.as_str()))
            .bind(update.avatar.is_some())
            .bind(update.avatar.clone().flatten())
            .bind(update.phone.is_some())
            .bind(update.phone.clone().flatten())
            .bind(update.shipping_address.is_some())
            .bind(update.shipping_address.flatten().map(|a| a.as_uuid()))
            .bind(update.billing_address.is_some())
            .bind(update.billing_address.flatten().map(|a| a.as_uuid()))
            .fetch_optional(&self.pool)
            .await?;
        found(id, row)
    }

    async fn update_password_hash(&self, id: UserId, password_hash: &str) -> Result<(), UserError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(password_hash)
                .execute(&self.pool)
                .await?;
        affected(id, result.rows_affected())
    }

    async fn set_refresh_token(&self, id: UserId, digest: Option<&str>) -> Result<(), UserError> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(digest)
                .execute(&self.pool)
                .await?;
        affected(id, result.rows_affected())
    }

    async fn rotate_refresh_token(
        &self,
        id: UserId,
        current: &str,
        next: &str,
    ) -> Result<bool, UserError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = $3, updated_at = now() \
             WHERE id = $1 AND refresh_token = $2",
        )
        .bind(id.as_uuid())
        .bind(current)
        .bind(next)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_otp(
        &self,
        id: UserId,
        code: u32,
        expires: DateTime<Utc>,
    ) -> Result<(), UserError> {
        let result = sqlx::query(
            "UPDATE users SET otp = $2, otp_expires = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(otp_column(Some(code)))
        .bind(expires)
        .execute(&self.pool)
        .await?;
        affected(id, result.rows_affected())
    }

    async fn discard_otp(&self, id: UserId, code: u32) -> Result<(), UserError> {
        sqlx::query(
            "UPDATE users SET otp = NULL, otp_expires = NULL, updated_at = now() \
             WHERE id = $1 AND otp = $2",
        )
        .bind(id.as_uuid())
        .bind(otp_column(Some(code)))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn confirm_otp(
        &self,
        id: UserId,
        code: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, UserError> {
        let sql = format!(
            "UPDATE users SET is_verified = TRUE, otp = NULL, otp_expires = NULL, \
               updated_at = now() \
             WHERE id = $1 AND otp = $2 AND otp_expires > $3 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_uuid())
            .bind(otp_column(Some(code)))
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn add_to_wishlist(&self, id: UserId, product: ProductId) -> Result<User, UserError> {
        self.append_unique("wishlist", id, product.as_uuid()).await
    }

    async fn remove_from_wishlist(
        &self,
        id: UserId,
        product: ProductId,
    ) -> Result<User, UserError> {
        let sql = format!(
            "UPDATE users SET \
               updated_at = CASE WHEN $2 = ANY(wishlist) THEN now() ELSE updated_at END, \
               wishlist = array_remove(wishlist, $2) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_uuid())
            .bind(product.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        found(id, row)
    }

    async fn add_order(&self, id: UserId, order: OrderId) -> Result<User, UserError> {
        self.append_unique("orders", id, order.as_uuid()).await
    }

    async fn delete(&self, id: UserId) -> Result<bool, UserError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
