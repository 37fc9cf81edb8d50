//! Live telemetry channel.
//!
//! One current [`TelemetryState`] is shared by every subscriber. Each
//! published update is merged into it, stamped, and delivered synchronously
//! to all subscribers in registration order. Subscribing delivers the
//! current state immediately.
//!
//! The simulation helpers stand in for a device transport. A real transport
//! only needs to feed [`TelemetryChannel::publish_update`] (or
//! [`TelemetryChannel::ingest_json`] with the device's JSON payload).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TelemetryConfig;
use crate::error::Result;

/// Snapshot of a vest's position, battery and alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryState {
    /// Reporting device.
    pub device_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Whether the panic button is active.
    pub sos_active: bool,
    /// Time of the last update, serialized as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
    /// Battery charge, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
}

/// Coarse battery level for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    /// Below 20%.
    Low,
    /// 20% to 49%.
    Medium,
    /// 50% and above.
    High,
}

impl TelemetryState {
    /// Map search link for the current position.
    #[must_use]
    pub fn maps_url(&self) -> String {
        format!(
            "https://www.google.com/maps/search/?api=1&query={},{}",
            self.latitude, self.longitude
        )
    }

    /// Coarse battery level, if reported.
    #[must_use]
    pub fn battery_status(&self) -> Option<BatteryStatus> {
        self.battery_level.map(|level| match level {
            0..=19 => BatteryStatus::Low,
            20..=49 => BatteryStatus::Medium,
            _ => BatteryStatus::High,
        })
    }
}

/// A partial state as delivered by a device. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryUpdate {
    /// Reporting device.
    pub device_id: Option<String>,
    /// Latitude in degrees.
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    pub longitude: Option<f64>,
    /// Panic button state.
    pub sos_active: Option<bool>,
    /// Battery charge; clamped to 0-100.
    pub battery_level: Option<f64>,
}

impl TelemetryUpdate {
    fn apply_to(self, state: &mut TelemetryState) {
        if let Some(device_id) = self.device_id {
            state.device_id = device_id;
        }
        if let Some(latitude) = self.latitude {
            state.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            state.longitude = longitude;
        }
        if let Some(sos) = self.sos_active {
            state.sos_active = sos;
        }
        if let Some(level) = self.battery_level.filter(|l| !l.is_nan()) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let clamped = level.round().clamp(0.0, 100.0) as u8;
            state.battery_level = Some(clamped);
        }
    }
}

type Listener = Arc<dyn Fn(&TelemetryState) + Send + Sync>;

struct Inner {
    state: TelemetryState,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Publish/subscribe channel over the current telemetry state.
///
/// Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct TelemetryChannel {
    inner: Arc<Mutex<Inner>>,
    move_amount: f64,
}

impl fmt::Debug for TelemetryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("TelemetryChannel")
            .field("state", &inner.state)
            .field("subscribers", &inner.listeners.len())
            .field("move_amount", &self.move_amount)
            .finish()
    }
}

impl TelemetryChannel {
    /// Create a channel holding `initial`. Simulated moves jitter each axis by
    /// up to half of `move_amount`.
    #[must_use]
    pub fn new(initial: TelemetryState, move_amount: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: initial,
                listeners: Vec::new(),
                next_id: 0,
            })),
            move_amount,
        }
    }

    /// Create a channel seeded from configuration, stamped now.
    #[must_use]
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(
            TelemetryState {
                device_id: config.device_id.clone(),
                latitude: config.latitude,
                longitude: config.longitude,
                sos_active: false,
                last_update: Utc::now(),
                battery_level: Some(config.battery_level.min(100)),
            },
            config.move_amount,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current state.
    #[must_use]
    pub fn current(&self) -> TelemetryState {
        self.lock().state.clone()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Register `callback` and call it once with the current state.
    ///
    /// The channel is global: `device_id` is recorded for logging only.
    pub fn subscribe<F>(&self, device_id: &str, callback: F) -> Subscription
    where
        F: Fn(&TelemetryState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(callback);
        let (id, snapshot) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Arc::clone(&listener)));
            (id, inner.state.clone())
        };
        debug!(subscription = id, device_id, "Telemetry subscriber added");

        listener(&snapshot);
        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Merge `update` into the current state, stamp it, and notify every
    /// subscriber in registration order. Returns the new state.
    pub fn publish_update(&self, update: TelemetryUpdate) -> TelemetryState {
        let (snapshot, listeners) = {
            let mut inner = self.lock();
            update.apply_to(&mut inner.state);
            inner.state.last_update = Utc::now();
            let listeners: Vec<Listener> =
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (inner.state.clone(), listeners)
        };
        debug!(
            device_id = %snapshot.device_id,
            latitude = snapshot.latitude,
            longitude = snapshot.longitude,
            sos = snapshot.sos_active,
            subscribers = listeners.len(),
            "Telemetry update"
        );

        for listener in listeners {
            listener(&snapshot);
        }
        snapshot
    }

    /// Parse a device JSON payload and publish it.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON telemetry object.
    pub fn ingest_json(&self, payload: &str) -> Result<TelemetryState> {
        let update: TelemetryUpdate = serde_json::from_str(payload)?;
        Ok(self.publish_update(update))
    }

    /// Move the position by a random offset of at most `move_amount / 2` per axis.
    pub fn simulate_movement<R: Rng + ?Sized>(&self, rng: &mut R) -> TelemetryState {
        let current = self.current();
        let latitude = current.latitude + (rng.gen::<f64>() - 0.5) * self.move_amount;
        let longitude = current.longitude + (rng.gen::<f64>() - 0.5) * self.move_amount;
        self.publish_update(TelemetryUpdate {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..TelemetryUpdate::default()
        })
    }

    /// Raise or clear the panic alarm.
    pub fn simulate_sos(&self, active: bool) -> TelemetryState {
        if active {
            info!("Simulated SOS raised");
        }
        self.publish_update(TelemetryUpdate {
            sos_active: Some(active),
            ..TelemetryUpdate::default()
        })
    }
}

/// Handle returned by [`TelemetryChannel::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    channel: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Remove the callback from the channel.
    ///
    /// Returns `false` if the channel is gone or the callback was already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.channel.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.listeners.len();
        inner.listeners.retain(|(id, _)| *id != self.id);
        let removed = inner.listeners.len() < before;
        if removed {
            debug!(subscription = self.id, "Telemetry subscriber removed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn channel() -> TelemetryChannel {
        TelemetryChannel::from_config(&TelemetryConfig::default())
    }

    fn recorder() -> (Arc<Mutex<Vec<TelemetryState>>>, impl Fn(&TelemetryState) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |s: &TelemetryState| sink.lock().unwrap().push(s.clone()))
    }

    #[test]
    fn test_subscribe_delivers_current_state() {
        let channel = channel();
        let (seen, callback) = recorder();

        let _sub = channel.subscribe("VEST-UNKNOWN", callback);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].device_id, "VEST-DEMO");
        assert_eq!(seen[0].battery_level, Some(85));
    }

    #[test]
    fn test_publish_notifies_in_registration_order() {
        let channel = channel();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for n in 0..3 {
            let order = Arc::clone(&order);
            subs.push(channel.subscribe("VEST-DEMO", move |_| order.lock().unwrap().push(n)));
        }
        order.lock().unwrap().clear();

        channel.simulate_sos(true);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let channel = channel();
        let (seen, callback) = recorder();
        let sub = channel.subscribe("VEST-DEMO", callback);

        assert!(sub.unsubscribe());
        assert_eq!(channel.subscriber_count(), 0);
        channel.simulate_sos(true);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_channel_dropped() {
        let channel = channel();
        let sub = channel.subscribe("VEST-DEMO", |_| {});
        drop(channel);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_publish_merges_partial_update() {
        let channel = channel();
        let before = channel.current();

        let after = channel.publish_update(TelemetryUpdate {
            battery_level: Some(40.0),
            ..TelemetryUpdate::default()
        });

        assert_eq!(after.battery_level, Some(40));
        assert_eq!(after.device_id, before.device_id);
        assert!((after.latitude - before.latitude).abs() < f64::EPSILON);
        assert!(after.last_update >= before.last_update);
        assert_eq!(channel.current(), after);
    }

    #[test]
    fn test_battery_clamped() {
        let channel = channel();
        let high = channel.publish_update(TelemetryUpdate {
            battery_level: Some(180.0),
            ..TelemetryUpdate::default()
        });
        assert_eq!(high.battery_level, Some(100));

        let low = channel.publish_update(TelemetryUpdate {
            battery_level: Some(-5.0),
            ..TelemetryUpdate::default()
        });
        assert_eq!(low.battery_level, Some(0));
    }

    #[test]
    fn test_simulate_movement_stays_within_jitter() {
        let channel = channel();
        let start = channel.current();
        let mut rng = StdRng::seed_from_u64(7);

        let moved = channel.simulate_movement(&mut rng);
        assert!((moved.latitude - start.latitude).abs() <= 0.0005);
        assert!((moved.longitude - start.longitude).abs() <= 0.0005);
        assert_ne!(
            (moved.latitude, moved.longitude),
            (start.latitude, start.longitude)
        );
    }

    #[test]
    fn test_simulate_sos_toggles() {
        let channel = channel();
        assert!(channel.simulate_sos(true).sos_active);
        assert!(!channel.simulate_sos(false).sos_active);
    }

    #[test]
    fn test_ingest_device_payload() {
        let channel = channel();
        let (seen, callback) = recorder();
        let _sub = channel.subscribe("VEST-007", callback);

        let state = channel
            .ingest_json(
                r#"{"deviceId": "VEST-007", "latitude": -2.17, "longitude": -79.92, "sosActive": true, "batteryLevel": 85}"#,
            )
            .unwrap();

        assert_eq!(state.device_id, "VEST-007");
        assert!(state.sos_active);
        assert_eq!(seen.lock().unwrap().last(), Some(&state));
    }

    #[test]
    fn test_ingest_rejects_non_object() {
        let channel = channel();
        assert!(channel.ingest_json("[1, 2]").is_err());
        assert!(channel.ingest_json("nope").is_err());
    }

    #[test]
    fn test_listener_may_publish() {
        let channel = channel();
        let inner = channel.clone();
        let _sub = channel.subscribe("VEST-DEMO", move |state| {
            if state.sos_active && state.battery_level != Some(1) {
                inner.publish_update(TelemetryUpdate {
                    battery_level: Some(1.0),
                    ..TelemetryUpdate::default()
                });
            }
        });

        channel.simulate_sos(true);
        assert_eq!(channel.current().battery_level, Some(1));
    }

    #[test]
    fn test_state_json_shape() {
        let state = channel().current();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["deviceId"], "VEST-DEMO");
        assert_eq!(json["sosActive"], false);
        assert!(json["lastUpdate"].is_i64());

        let parsed: TelemetryState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.device_id, state.device_id);
    }

    #[test]
    fn test_maps_url_and_battery_status() {
        let mut state = channel().current();
        assert!(state.maps_url().contains("query=-0.180653,-78.467834"));

        assert_eq!(state.battery_status(), Some(BatteryStatus::High));
        state.battery_level = Some(30);
        assert_eq!(state.battery_status(), Some(BatteryStatus::Medium));
        state.battery_level = Some(5);
        assert_eq!(state.battery_status(), Some(BatteryStatus::Low));
        state.battery_level = None;
        assert_eq!(state.battery_status(), None);
    }

    #[test]
    fn test_debug_shows_subscriber_count() {
        let channel = channel();
        let _sub = channel.subscribe("VEST-DEMO", |_| {});
        assert!(format!("{channel:?}").contains("subscribers: 1"));
    }
}
