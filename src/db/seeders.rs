//! Database seeders for built-in data
//!
//! The VPN location pool is not editable at runtime. It is refreshed from
//! the table below on every startup.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use super::{now_timestamp, upsert_vpn_location, VpnLocation};

/// Seed built-in VPN locations (runs on every startup to add/update entries)
pub async fn seed_vpn_locations(pool: &SqlitePool) -> Result<()> {
    // Format: (id, country, country_code, city, latitude, longitude, ip_pool, latency_min, latency_max, is_pro)
    #[allow(clippy::type_complexity)]
    let locations: Vec<(&str, &str, &str, &str, &str, &str, &[&str], i64, i64, bool)> = vec![
        // ==================== FREE ====================
        (
            "us-east",
            "United States",
            "US",
            "New York",
            "40.7128",
            "-74.0060",
            &["104.28.14.2", "104.28.14.17", "104.28.15.40"],
            18,
            45,
            false,
        ),
        (
            "us-west",
            "United States",
            "US",
            "San Francisco",
            "37.7749",
            "-122.4194",
            &["172.67.181.5", "172.67.181.88", "172.67.182.9"],
            22,
            55,
            false,
        ),
        (
            "nl-ams",
            "Netherlands",
            "NL",
            "Amsterdam",
            "52.3676",
            "4.9041",
            &["185.107.56.12", "185.107.56.77", "185.107.57.3"],
            35,
            80,
            false,
        ),
        (
            "de-fra",
            "Germany",
            "DE",
            "Frankfurt",
            "50.1109",
            "8.6821",
            &["89.187.160.4", "89.187.160.31", "89.187.161.200"],
            30,
            75,
            false,
        ),
        // ==================== PRO ====================
        (
            "uk-lon",
            "United Kingdom",
            "GB",
            "London",
            "51.5074",
            "-0.1278",
            &["45.152.180.6", "45.152.180.41", "45.152.181.19"],
            25,
            60,
            true,
        ),
        (
            "jp-tyo",
            "Japan",
            "JP",
            "Tokyo",
            "35.6762",
            "139.6503",
            &["103.79.141.8", "103.79.141.52", "103.79.142.14"],
            120,
            190,
            true,
        ),
        (
            "sg-sin",
            "Singapore",
            "SG",
            "Singapore",
            "1.3521",
            "103.8198",
            &["138.199.60.3", "138.199.60.71", "138.199.61.22"],
            140,
            220,
            true,
        ),
        (
            "ch-zrh",
            "Switzerland",
            "CH",
            "Zurich",
            "47.3769",
            "8.5417",
            &["179.43.128.10", "179.43.128.93", "179.43.129.5"],
            40,
            85,
            true,
        ),
    ];

    let now = now_timestamp();
    let count = locations.len();
    for (id, country, country_code, city, latitude, longitude, ips, latency_min, latency_max, is_pro) in
        locations
    {
        let location = VpnLocation {
            id: id.to_string(),
            country: country.to_string(),
            country_code: country_code.to_string(),
            city: city.to_string(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            ip_pool: serde_json::to_string(ips)?,
            latency_min,
            latency_max,
            is_pro,
            created_at: now.clone(),
        };
        upsert_vpn_location(pool, &location).await?;
    }

    info!("Seeded {} VPN locations", count);
    Ok(())
}
