use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rastro_core::{
    Device, DeviceId, Geofence, GeofenceId, Group, Maintenance, MotionColumns, NotificationRule,
    Position, Value,
};
use tracing::warn;

use crate::storage::Storage;

/// Depth guard for the group parent chain.
const MAX_GROUP_DEPTH: usize = 10;

/// Read-mostly per-device object cache.
///
/// A device's objects are loaded when the device is pinned and evicted
/// when the pin count returns to zero. The sequencer holds a pin for the
/// whole time a device has positions in flight, so no chain ever
/// observes a half-evicted device. Last positions and detector state
/// survive eviction; they are small and keep their hysteresis across
/// idle periods.
pub struct DeviceCache<S: Storage> {
    storage: Arc<S>,
    server_attributes: BTreeMap<String, Value>,
    entries: DashMap<DeviceId, CacheEntry>,
    last_positions: DashMap<DeviceId, Position>,
    runtime: DashMap<DeviceId, DeviceRuntimeState>,
}

struct CacheEntry {
    pins: usize,
    device: Option<Device>,
    groups: Vec<Group>,
    geofences: Vec<Geofence>,
    notification_rules: Vec<NotificationRule>,
    maintenances: Vec<Maintenance>,
}

/// Per-device detector state that lives only in process memory.
#[derive(Debug, Default)]
pub struct DeviceRuntimeState {
    /// Whether the device was over the speed limit at the last
    /// evaluation; `None` until the first evaluation seeds it.
    pub overspeed_state: Option<bool>,
    /// First position of the current overspeed streak.
    pub overspeed_position: Option<Position>,
    pub overspeed_geofence_id: GeofenceId,
    /// Fix time at which the device entered each geofence it is
    /// currently inside.
    pub geofence_entered: HashMap<GeofenceId, jiff::Timestamp>,
}

impl<S: Storage> DeviceCache<S> {
    pub fn new(storage: Arc<S>, server_attributes: BTreeMap<String, Value>) -> Self {
        Self {
            storage,
            server_attributes,
            entries: DashMap::new(),
            last_positions: DashMap::new(),
            runtime: DashMap::new(),
        }
    }

    /// Hold the device's objects in the cache. Reference counted; every
    /// `pin` must be matched by one `unpin`.
    pub async fn pin(&self, device_id: DeviceId) -> Result<(), S::Error> {
        if let Some(mut entry) = self.entries.get_mut(&device_id) {
            entry.pins += 1;
            return Ok(());
        }

        let loaded = self.load(device_id).await?;

        match self.entries.entry(device_id) {
            Entry::Occupied(mut occupied) => occupied.get_mut().pins += 1,
            Entry::Vacant(vacant) => {
                vacant.insert(loaded);
            }
        }

        Ok(())
    }

    /// Release one pin; the entry is evicted when the count reaches zero.
    pub fn unpin(&self, device_id: DeviceId) {
        let evict = match self.entries.get_mut(&device_id) {
            Some(mut entry) => {
                entry.pins = entry.pins.saturating_sub(1);
                entry.pins == 0
            }
            None => {
                warn!(device_id = ?device_id, "Unpin without matching pin");
                false
            }
        };
        if evict {
            self.entries.remove_if(&device_id, |_, entry| entry.pins == 0);
        }
    }

    pub fn pinned(&self, device_id: DeviceId) -> bool {
        self.entries.contains_key(&device_id)
    }

    async fn load(&self, device_id: DeviceId) -> Result<CacheEntry, S::Error> {
        let device = self.storage.get_device(device_id).await?;

        let mut groups = Vec::new();
        let mut group_id = device.as_ref().map(|device| device.group_id);
        while let Some(id) = group_id.filter(|id| id.0 != 0) {
            if groups.len() >= MAX_GROUP_DEPTH {
                warn!(device_id = ?device_id, "Group chain too deep, truncating");
                break;
            }
            match self.storage.get_group(id).await? {
                Some(group) => {
                    group_id = Some(group.group_id);
                    groups.push(group);
                }
                None => break,
            }
        }

        let geofences = self.storage.list_geofences().await?;
        let notification_rules = self.storage.list_notification_rules().await?;
        let maintenances = self.storage.list_maintenances().await?;

        if !self.last_positions.contains_key(&device_id)
            && let Some(position) = self.storage.latest_position(device_id).await?
        {
            self.last_positions.insert(device_id, position);
        }

        Ok(CacheEntry {
            pins: 1,
            device,
            groups,
            geofences,
            notification_rules,
            maintenances,
        })
    }

    pub fn device(&self, device_id: DeviceId) -> Option<Device> {
        self.entries
            .get(&device_id)
            .and_then(|entry| entry.device.clone())
    }

    /// Update the cached copy of a device's motion columns after a
    /// state-machine transition.
    pub fn update_motion(&self, device_id: DeviceId, motion: &MotionColumns) {
        if let Some(mut entry) = self.entries.get_mut(&device_id)
            && let Some(device) = entry.device.as_mut()
        {
            device.motion = motion.clone();
        }
    }

    pub fn geofences(&self, device_id: DeviceId) -> Vec<Geofence> {
        self.entries
            .get(&device_id)
            .map(|entry| entry.geofences.clone())
            .unwrap_or_default()
    }

    pub fn notification_rules(&self, device_id: DeviceId) -> Vec<NotificationRule> {
        self.entries
            .get(&device_id)
            .map(|entry| entry.notification_rules.clone())
            .unwrap_or_default()
    }

    pub fn maintenances(&self, device_id: DeviceId) -> Vec<Maintenance> {
        self.entries
            .get(&device_id)
            .map(|entry| entry.maintenances.clone())
            .unwrap_or_default()
    }

    pub fn last_position(&self, device_id: DeviceId) -> Option<Position> {
        self.last_positions
            .get(&device_id)
            .map(|position| position.clone())
    }

    /// Record the last processed position, unless an out-of-order fix
    /// would move the reference backwards.
    pub fn set_last_position(&self, position: Position) {
        match self.last_positions.entry(position.device_id) {
            Entry::Occupied(mut occupied) => {
                if position.fix_time >= occupied.get().fix_time {
                    occupied.insert(position);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(position);
            }
        }
    }

    /// Attribute lookup with fallback: device, then the group chain
    /// walking upward, then the server-level defaults.
    pub fn lookup_attribute(&self, device_id: DeviceId, key: &str) -> Option<Value> {
        if let Some(entry) = self.entries.get(&device_id) {
            if let Some(value) = entry
                .device
                .as_ref()
                .and_then(|device| device.attributes.get(key))
            {
                return Some(value.clone());
            }
            for group in &entry.groups {
                if let Some(value) = group.attributes.get(key) {
                    return Some(value.clone());
                }
            }
        }
        self.server_attributes.get(key).cloned()
    }

    pub fn lookup_double(&self, device_id: DeviceId, key: &str) -> Option<f64> {
        self.lookup_attribute(device_id, key)
            .and_then(|value| value.as_f64())
    }

    pub fn lookup_string(&self, device_id: DeviceId, key: &str) -> Option<String> {
        self.lookup_attribute(device_id, key)
            .and_then(|value| value.as_str().map(str::to_owned))
    }

    /// Run a closure against the device's detector state, creating an
    /// empty state on first use. The per-device sequencer guarantees no
    /// two chains for the same device run concurrently, so this lock is
    /// only contended across devices.
    pub fn with_runtime<R>(
        &self,
        device_id: DeviceId,
        f: impl FnOnce(&mut DeviceRuntimeState) -> R,
    ) -> R {
        let mut entry = self.runtime.entry(device_id).or_default();
        f(&mut entry)
    }
}
