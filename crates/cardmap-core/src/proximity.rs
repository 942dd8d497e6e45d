//! Nearby-store notifications driven by position updates.
//!
//! Position fixes arrive far more often than the user actually moves, so
//! updates closer than the movement threshold to the last evaluated fix
//! are ignored. Each store is announced once per visit: it has to leave the
//! notification radius before it can be announced again.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::Merchant;

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance between two points (haversine)
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    pub notify_radius_m: f64,
    pub movement_threshold_m: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            notify_radius_m: 100.0,
            movement_threshold_m: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityNotice {
    pub merchant_id: String,
    pub merchant_name: String,
    pub distance_m: f64,
    pub message: String,
}

pub struct ProximityNotifier {
    config: ProximityConfig,
    last_position: Option<GeoPoint>,
    notified: HashSet<String>,
}

impl ProximityNotifier {
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            config,
            last_position: None,
            notified: HashSet::new(),
        }
    }

    /// Evaluate a new position fix, returning notices for newly reached stores, nearest first.
    pub fn update(&mut self, position: GeoPoint, merchants: &[Merchant]) -> Vec<ProximityNotice> {
        if let Some(last) = self.last_position {
            let moved = distance_meters(last, position);
            if moved < self.config.movement_threshold_m {
                debug!(moved_m = moved, "Position change below threshold, skipping");
                return Vec::new();
            }
        }
        self.last_position = Some(position);
        self.notified
            .retain(|id| merchants.iter().any(|merchant| &merchant.id == id));

        let mut notices = Vec::new();
        for merchant in merchants {
            let distance = distance_meters(position, merchant.location);
            if distance > self.config.notify_radius_m {
                self.notified.remove(&merchant.id);
                continue;
            }
            if self.notified.insert(merchant.id.clone()) {
                notices.push(ProximityNotice {
                    merchant_id: merchant.id.clone(),
                    merchant_name: merchant.name.clone(),
                    distance_m: distance,
                    message: format!(
                        "{} is {:.0}m away - best pick: {}",
                        merchant.name,
                        distance,
                        merchant.benefit_display()
                    ),
                });
            }
        }

        notices.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        notices
    }

    /// Forget the last position and announced stores
    pub fn reset(&mut self) {
        self.last_position = None;
        self.notified.clear();
    }
}
