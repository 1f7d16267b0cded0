use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rastro_core::{
    Device, DeviceId, Driver, DriverId, Event, EventId, Geofence, Group, GroupId, Maintenance,
    MotionColumns, NotificationRule, Position, PositionId,
};

use crate::storage::Storage;

/// In-memory storage implementation.
/// This is primarily intended for testing and as a reference
/// implementation of the Storage trait.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    devices: HashMap<DeviceId, Device>,
    devices_by_unique_id: HashMap<String, DeviceId>,
    positions: HashMap<PositionId, Position>,
    latest_positions: HashMap<DeviceId, PositionId>,
    events: HashMap<EventId, Event>,
    groups: HashMap<GroupId, Group>,
    geofences: Vec<Geofence>,
    notification_rules: Vec<NotificationRule>,
    maintenances: Vec<Maintenance>,
    drivers: HashMap<String, Driver>,
}

impl Inner {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Error type for MemoryStorage.
#[derive(Debug, thiserror::Error)]
pub enum MemoryStorageError {
    #[error("mutex poisoned: {0}")]
    MutexPoisoned(String),

    #[error("device not found: {0:?}")]
    DeviceNotFound(DeviceId),
}

impl<T> From<PoisonError<T>> for MemoryStorageError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryStorageError::MutexPoisoned(err.to_string())
    }
}

impl MemoryStorage {
    /// Number of stored positions, for tests and stats.
    pub fn position_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.positions.len()).unwrap_or(0)
    }

    /// Number of stored events, for tests and stats.
    pub fn event_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.events.len()).unwrap_or(0)
    }

    /// All stored events for a device, in insertion order of id.
    pub fn events_for_device(&self, device_id: DeviceId) -> Vec<Event> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|event| event.device_id == device_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.id);
        events
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    type Error = MemoryStorageError;

    async fn add_device(&self, device: &Device) -> Result<DeviceId, Self::Error> {
        let mut inner = self.inner.lock()?;
        let id = DeviceId(inner.assign_id());
        let mut device = device.clone();
        device.id = id;
        inner
            .devices_by_unique_id
            .insert(device.unique_id.clone(), id);
        inner.devices.insert(id, device);
        Ok(id)
    }

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.devices.get(&id).cloned())
    }

    async fn get_device_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<Device>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner
            .devices_by_unique_id
            .get(unique_id)
            .and_then(|id| inner.devices.get(id))
            .cloned())
    }

    async fn update_motion_state(
        &self,
        device_id: DeviceId,
        motion: &MotionColumns,
    ) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        let device = inner
            .devices
            .get_mut(&device_id)
            .ok_or(MemoryStorageError::DeviceNotFound(device_id))?;
        device.motion = motion.clone();
        Ok(())
    }

    async fn add_position(&self, position: &Position) -> Result<PositionId, Self::Error> {
        let mut inner = self.inner.lock()?;
        let id = PositionId(inner.assign_id());
        let mut position = position.clone();
        position.id = id;

        let newer = match inner
            .latest_positions
            .get(&position.device_id)
            .and_then(|latest| inner.positions.get(latest))
        {
            Some(latest) => position.fix_time >= latest.fix_time,
            None => true,
        };
        if newer {
            inner.latest_positions.insert(position.device_id, id);
        }

        inner.positions.insert(id, position);
        Ok(id)
    }

    async fn latest_position(&self, device_id: DeviceId) -> Result<Option<Position>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner
            .latest_positions
            .get(&device_id)
            .and_then(|id| inner.positions.get(id))
            .cloned())
    }

    async fn add_event(&self, event: &Event) -> Result<EventId, Self::Error> {
        let mut inner = self.inner.lock()?;
        let id = EventId(inner.assign_id());
        let mut event = event.clone();
        event.id = id;
        inner.events.insert(id, event);
        Ok(id)
    }

    async fn add_group(&self, group: &Group) -> Result<GroupId, Self::Error> {
        let mut inner = self.inner.lock()?;
        let id = GroupId(inner.assign_id());
        let mut group = group.clone();
        group.id = id;
        inner.groups.insert(id, group);
        Ok(id)
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.groups.get(&id).cloned())
    }

    async fn add_geofence(&self, geofence: &Geofence) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        inner.geofences.push(geofence.clone());
        Ok(())
    }

    async fn list_geofences(&self) -> Result<Vec<Geofence>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.geofences.clone())
    }

    async fn add_notification_rule(&self, rule: &NotificationRule) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        inner.notification_rules.push(rule.clone());
        Ok(())
    }

    async fn list_notification_rules(&self) -> Result<Vec<NotificationRule>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.notification_rules.clone())
    }

    async fn add_maintenance(&self, maintenance: &Maintenance) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        inner.maintenances.push(maintenance.clone());
        Ok(())
    }

    async fn list_maintenances(&self) -> Result<Vec<Maintenance>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.maintenances.clone())
    }

    async fn add_driver(&self, driver: &Driver) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;
        let id = DriverId(inner.assign_id());
        let mut driver = driver.clone();
        driver.id = id;
        inner.drivers.insert(driver.unique_id.clone(), driver);
        Ok(())
    }

    async fn get_driver_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<Driver>, Self::Error> {
        let inner = self.inner.lock()?;
        Ok(inner.drivers.get(unique_id).cloned())
    }
}
