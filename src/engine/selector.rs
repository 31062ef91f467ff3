//! Simulated VPN egress assignment.

use chrono::Utc;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;

use super::{EngineError, EngineResult};
use crate::db::{list_vpn_locations, Store, SubscriptionTier, User, VpnLocation};

/// Identity handed to the client after `connect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub ip: String,
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub latitude: String,
    pub longitude: String,
    /// Milliseconds
    pub latency: i64,
    pub location_id: String,
}

/// Locations a user of `tier` may see
pub fn visible_locations(locations: Vec<VpnLocation>, tier: SubscriptionTier) -> Vec<VpnLocation> {
    match tier {
        SubscriptionTier::Pro => locations,
        SubscriptionTier::Free => locations.into_iter().filter(|l| !l.is_pro).collect(),
    }
}

/// Pick a location and draw an IP and latency from it.
///
/// A requested id outside the visible set (pro-only for a free user, or
/// unknown) falls back to a uniform random pick. Locations without IPs are
/// never selected.
pub fn select<R: Rng + ?Sized>(
    locations: Vec<VpnLocation>,
    tier: SubscriptionTier,
    requested: Option<&str>,
    rng: &mut R,
) -> EngineResult<Assignment> {
    let candidates: Vec<(VpnLocation, Vec<String>)> = visible_locations(locations, tier)
        .into_iter()
        .filter_map(|location| {
            let pool = location.ip_pool();
            (!pool.is_empty()).then_some((location, pool))
        })
        .collect();

    let chosen = requested
        .and_then(|id| candidates.iter().find(|(location, _)| location.id == id))
        .or_else(|| candidates.choose(rng))
        .ok_or_else(|| {
            EngineError::ResourceExhausted("No VPN locations available".to_string())
        })?;

    let (location, pool) = chosen;
    let ip = pool
        .choose(rng)
        .cloned()
        .ok_or_else(|| EngineError::ResourceExhausted("No VPN locations available".to_string()))?;
    let (min, max) = if location.latency_min <= location.latency_max {
        (location.latency_min, location.latency_max)
    } else {
        (location.latency_max, location.latency_min)
    };
    let latency = rng.random_range(min..=max);

    Ok(Assignment {
        ip,
        city: location.city.clone(),
        country: location.country.clone(),
        country_code: location.country_code.clone(),
        latitude: location.latitude.clone(),
        longitude: location.longitude.clone(),
        latency,
        location_id: location.id.clone(),
    })
}

pub struct ConnectionSelector {
    store: Store,
}

impl ConnectionSelector {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn locations(&self, user: &User) -> EngineResult<Vec<VpnLocation>> {
        let pool = self.store.pool()?;
        let locations = list_vpn_locations(pool).await?;
        Ok(visible_locations(locations, user.effective_tier(Utc::now())))
    }

    pub async fn connect(&self, user: &User, location_id: Option<&str>) -> EngineResult<Assignment> {
        let pool = self.store.pool()?;
        let locations = list_vpn_locations(pool).await?;
        let tier = user.effective_tier(Utc::now());

        let assignment = select(locations, tier, location_id, &mut rand::rng())?;
        tracing::debug!(
            user_id = %user.id,
            location = %assignment.location_id,
            latency = assignment.latency,
            "VPN identity assigned"
        );
        Ok(assignment)
    }
}
