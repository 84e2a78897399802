//! Authoritative device registry
//!
//! Each device slot is guarded independently through the map's entry API,
//! so concurrent heartbeats for different devices never contend. Ordering
//! within a slot is last-writer-wins by event timestamp.

mod record;

pub use record::{escape_html, DeviceRecord, UNKNOWN};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use anchor_common::{DeviceId, SharedClock, SystemClock};
use anchor_protocol::DeviceEvent;

use crate::error::RegistryError;

/// Default number of raw events kept per device
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// What an upsert did to the device's core fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First event for this id
    Created,
    /// Event was newer than `last_seen` and was applied
    Updated,
    /// Event was not newer; only appended to history
    Stale,
}

/// Registry of every device seen since startup
pub struct DeviceRegistry {
    devices: DashMap<DeviceId, DeviceRecord>,
    history_capacity: usize,
    clock: SharedClock,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new(history_capacity: usize, clock: SharedClock) -> Self {
        Self {
            devices: DashMap::new(),
            history_capacity: history_capacity.max(1),
            clock,
        }
    }

    /// Apply a status report.
    ///
    /// The event's own timestamp orders it; arrival time is used when it
    /// has none. The raw event always lands in history, but core fields
    /// only move when the event is strictly newer than `last_seen`.
    pub fn upsert(&self, mut event: DeviceEvent) -> Result<UpsertOutcome, RegistryError> {
        let id = match event.id.as_deref() {
            Some(id) if !id.is_empty() => DeviceId::new(id),
            _ => return Err(RegistryError::MissingId),
        };
        let at = *event.timestamp.get_or_insert_with(|| self.clock.now());

        let outcome = match self.devices.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                let previous = record.status;
                let outcome = if is_newer(at, record.last_seen) {
                    record.apply(&event, at);
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Stale
                };
                if record.status != previous {
                    tracing::info!(
                        "Device {} ({}) is now {}",
                        record.name,
                        id.short(),
                        record.status
                    );
                }
                record.push_history(event, self.history_capacity);
                outcome
            }
            Entry::Vacant(slot) => {
                let mut record = DeviceRecord::from_event(id.clone(), &event);
                record.apply(&event, at);
                tracing::info!(
                    "New device: {} ({}) from {}",
                    record.name,
                    id.short(),
                    record.ip
                );
                record.push_history(event, self.history_capacity);
                slot.insert(record);
                UpsertOutcome::Created
            }
        };

        if outcome == UpsertOutcome::Stale {
            tracing::debug!("Stale event for {} kept in history only", id.short());
        }
        Ok(outcome)
    }

    /// Snapshot of one device
    pub fn get(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.devices.get(id).map(|r| r.value().clone())
    }

    /// Display name of a known device
    pub fn display_name(&self, id: &DeviceId) -> Option<String> {
        self.devices.get(id).map(|r| r.name.clone())
    }

    /// Whether a device has been seen
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    /// Snapshot of every device, most recently seen first
    pub fn list(&self) -> Vec<DeviceRecord> {
        let mut devices: Vec<DeviceRecord> =
            self.devices.iter().map(|r| r.value().clone()).collect();
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        devices
    }

    /// Number of devices seen
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if no device has reported yet
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, SystemClock::shared())
    }
}

fn is_newer(at: DateTime<Utc>, last_seen: Option<DateTime<Utc>>) -> bool {
    last_seen.map_or(true, |seen| at > seen)
}
