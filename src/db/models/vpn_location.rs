//! VPN egress points.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct VpnLocation {
    pub id: String,
    pub country: String,
    pub country_code: String,
    pub city: String,
    pub latitude: String,
    pub longitude: String,
    /// JSON array of candidate IPv4 strings
    pub ip_pool: String,
    pub latency_min: i64,
    pub latency_max: i64,
    pub is_pro: bool,
    pub created_at: String,
}

impl VpnLocation {
    /// Parsed IP pool; a malformed column reads as an empty pool
    pub fn ip_pool(&self) -> Vec<String> {
        serde_json::from_str(&self.ip_pool).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnLocationResponse {
    pub id: String,
    pub country: String,
    pub country_code: String,
    pub city: String,
    pub latitude: String,
    pub longitude: String,
    pub latency_min: i64,
    pub latency_max: i64,
    pub is_pro: bool,
}

impl From<VpnLocation> for VpnLocationResponse {
    fn from(location: VpnLocation) -> Self {
        Self {
            id: location.id,
            country: location.country,
            country_code: location.country_code,
            city: location.city,
            latitude: location.latitude,
            longitude: location.longitude,
            latency_min: location.latency_min,
            latency_max: location.latency_max,
            is_pro: location.is_pro,
        }
    }
}

pub async fn list_vpn_locations(pool: &SqlitePool) -> Result<Vec<VpnLocation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM vpn_locations ORDER BY is_pro ASC, country ASC, city ASC")
        .fetch_all(pool)
        .await
}

pub async fn upsert_vpn_location(pool: &SqlitePool, location: &VpnLocation) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO vpn_locations (id, country, country_code, city, latitude, longitude,
                                   ip_pool, latency_min, latency_max, is_pro, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            country = excluded.country,
            country_code = excluded.country_code,
            city = excluded.city,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            ip_pool = excluded.ip_pool,
            latency_min = excluded.latency_min,
            latency_max = excluded.latency_max,
            is_pro = excluded.is_pro
        "#,
    )
    .bind(&location.id)
    .bind(&location.country)
    .bind(&location.country_code)
    .bind(&location.city)
    .bind(&location.latitude)
    .bind(&location.longitude)
    .bind(&location.ip_pool)
    .bind(location.latency_min)
    .bind(location.latency_max)
    .bind(location.is_pro)
    .bind(&location.created_at)
    .execute(pool)
    .await?;
    Ok(())
}
