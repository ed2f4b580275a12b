use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
    pub password_hash: Option<String>,
    pub is_verified: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    display_name: String,
    password_hash: Option<String>,
    is_verified: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            password_hash: row.password_hash,
            is_verified: row.is_verified != 0,
        }
    }
}

/// A resolved location to store only if the user has none yet.
#[derive(Debug, Clone)]
pub struct LocationSeed<'a> {
    pub user_id: &'a str,
    pub lat: f64,
    pub lng: f64,
    pub address: Option<&'a str>,
    pub default_radius_m: i64,
}

/// Stored location of a user.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
    pub radius_m: Option<i64>,
}

/// Whether a user is ready for location-based matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoStatus {
    pub ready: bool,
    pub has_location: bool,
    pub has_radius: bool,
    pub radius: Option<i64>,
}

const USER_COLUMNS: &str = "id, email, display_name, password_hash, is_verified";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new unverified user with a password.
    pub async fn create(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, email, display_name, password_hash, is_verified) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(id)
        .bind(email)
        .bind(display_name)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(sqlx::AssertSqlSafe(format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS)))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(sqlx::AssertSqlSafe(format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS)))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Mark a user's email as verified.
    pub async fn set_verified(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_verified = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_password(&self, id: &str, password_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store a location only if the user has none.
    ///
    /// A single conditional UPDATE: concurrent callers race on the
    /// `latitude IS NULL` predicate and at most one of them writes. Existing
    /// address and radius values are kept. Returns whether a row changed.
    pub async fn set_location_if_empty(&self, seed: &LocationSeed<'_>) -> Result<bool, sqlx::Error> {
        if !seed.lat.is_finite() || !seed.lng.is_finite() {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE users SET
                latitude = ?,
                longitude = ?,
                base_address = COALESCE(base_address, ?),
                search_radius_m = COALESCE(search_radius_m, ?)
             WHERE id = ? AND latitude IS NULL",
        )
        .bind(seed.lat)
        .bind(seed.lng)
        .bind(seed.address)
        .bind(seed.default_radius_m)
        .bind(seed.user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the stored location, if any.
    pub async fn get_location(&self, id: &str) -> Result<Option<UserLocation>, sqlx::Error> {
        sqlx::query_as(
            "SELECT latitude AS lat, longitude AS lng, base_address AS address, search_radius_m AS radius_m
             FROM users WHERE id = ? AND latitude IS NOT NULL AND longitude IS NOT NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Whether the user has a location and search radius.
    pub async fn geo_status(&self, id: &str) -> Result<GeoStatus, sqlx::Error> {
        let row: Option<(i32, Option<i64>)> = sqlx::query_as(
            "SELECT latitude IS NOT NULL, search_radius_m FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (has_location, radius) = match row {
            Some((has_location, radius)) => (has_location != 0, radius),
            None => (false, None),
        };
        let has_radius = radius.is_some();

        Ok(GeoStatus {
            ready: has_location && has_radius,
            has_location,
            has_radius,
            radius,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
