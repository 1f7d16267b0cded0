pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use rastro_core::{
    Device, DeviceId, Driver, Event, EventId, Geofence, Group, GroupId, Maintenance,
    MotionColumns, NotificationRule, Position, PositionId,
};

/// Storage abstraction for the pipeline.
///
/// Positions and events are append-only; the one mutable write the
/// pipeline performs is the partial motion-state update on a device row.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Error type specific to this storage implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert a device and return its assigned id.
    async fn add_device(&self, device: &Device) -> Result<DeviceId, Self::Error>;

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>, Self::Error>;

    async fn get_device_by_unique_id(&self, unique_id: &str)
    -> Result<Option<Device>, Self::Error>;

    /// Write back only the motion/trip columns of a device row, leaving
    /// every other column untouched.
    async fn update_motion_state(
        &self,
        device_id: DeviceId,
        motion: &MotionColumns,
    ) -> Result<(), Self::Error>;

    /// Insert a position row and return its assigned id.
    async fn add_position(&self, position: &Position) -> Result<PositionId, Self::Error>;

    /// The stored position with the newest fix time for a device.
    async fn latest_position(&self, device_id: DeviceId) -> Result<Option<Position>, Self::Error>;

    /// Insert an event row and return its assigned id.
    async fn add_event(&self, event: &Event) -> Result<EventId, Self::Error>;

    async fn add_group(&self, group: &Group) -> Result<GroupId, Self::Error>;

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, Self::Error>;

    async fn add_geofence(&self, geofence: &Geofence) -> Result<(), Self::Error>;

    async fn list_geofences(&self) -> Result<Vec<Geofence>, Self::Error>;

    async fn add_notification_rule(&self, rule: &NotificationRule) -> Result<(), Self::Error>;

    async fn list_notification_rules(&self) -> Result<Vec<NotificationRule>, Self::Error>;

    async fn add_maintenance(&self, maintenance: &Maintenance) -> Result<(), Self::Error>;

    async fn list_maintenances(&self) -> Result<Vec<Maintenance>, Self::Error>;

    async fn add_driver(&self, driver: &Driver) -> Result<(), Self::Error>;

    async fn get_driver_by_unique_id(&self, unique_id: &str)
    -> Result<Option<Driver>, Self::Error>;
}
