use async_trait::async_trait;
use rastro_core::{
    Device, DeviceId, Driver, Event, EventId, Geofence, GeofenceId, Group, GroupId, Maintenance,
    MaintenanceId, MotionColumns, NotificationId, NotificationRule, Position, PositionId,
};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool, migrate::Migrator};

use crate::storage::Storage;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation.
///
/// Scalar fields live in real columns so they can be indexed; attribute
/// maps, geometry and network blobs are stored as JSON text. Timestamps
/// are unix milliseconds.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

#[derive(Debug, thiserror::Error)]
pub enum SqliteStorageError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl SqliteStorage {
    pub async fn new(path: impl AsRef<str>) -> Result<Self, SqliteStorageError> {
        let connection_string = format!("sqlite:{}?mode=rwc", path.as_ref());
        let pool = SqlitePoolOptions::new().connect(&connection_string).await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> Result<Self, SqliteStorageError> {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }
}

fn millis(timestamp: jiff::Timestamp) -> i64 {
    timestamp.as_millisecond()
}

fn timestamp(millis: i64) -> Result<jiff::Timestamp, SqliteStorageError> {
    jiff::Timestamp::from_millisecond(millis)
        .map_err(|_| SqliteStorageError::InvalidTimestamp(millis))
}

fn row_to_device(row: &SqliteRow) -> Result<Device, SqliteStorageError> {
    let idle_start: Option<i64> = row.try_get("idle_start")?;
    let motion_time: Option<i64> = row.try_get("motion_time")?;

    Ok(Device {
        id: DeviceId(row.try_get("id")?),
        unique_id: row.try_get("unique_id")?,
        name: row.try_get("name")?,
        group_id: GroupId(row.try_get("group_id")?),
        attributes: serde_json::from_str(row.try_get::<&str, _>("attributes")?)?,
        motion: MotionColumns {
            streak: row.try_get("motion_streak")?,
            state: row.try_get("motion_state")?,
            time: motion_time.map(timestamp).transpose()?,
            distance: row.try_get("motion_distance")?,
            position_id: PositionId(row.try_get("motion_position_id")?),
            idle_state: row.try_get("idle_state")?,
            idle_time: jiff::SignedDuration::from_millis(row.try_get::<i64, _>("idle_time_ms")?),
            idle_start: idle_start.map(timestamp).transpose()?,
        },
    })
}

fn row_to_position(row: &SqliteRow) -> Result<Position, SqliteStorageError> {
    let network: Option<&str> = row.try_get("network")?;

    Ok(Position {
        id: PositionId(row.try_get("id")?),
        device_id: DeviceId(row.try_get("device_id")?),
        protocol: row.try_get("protocol")?,
        server_time: timestamp(row.try_get("server_time")?)?,
        device_time: timestamp(row.try_get("device_time")?)?,
        fix_time: timestamp(row.try_get("fix_time")?)?,
        valid: row.try_get("valid")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        altitude: row.try_get("altitude")?,
        speed: row.try_get("speed")?,
        course: row.try_get("course")?,
        accuracy: row.try_get("accuracy")?,
        address: row.try_get("address")?,
        geofence_ids: serde_json::from_str(row.try_get::<&str, _>("geofence_ids")?)?,
        attributes: serde_json::from_str(row.try_get::<&str, _>("attributes")?)?,
        network: network.map(serde_json::from_str).transpose()?,
        outdated: false,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    type Error = SqliteStorageError;

    async fn add_device(&self, device: &Device) -> Result<DeviceId, Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO devices (
                unique_id, name, group_id, attributes,
                motion_streak, motion_state, motion_time, motion_distance,
                motion_position_id, idle_state, idle_time_ms, idle_start
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&device.unique_id)
        .bind(&device.name)
        .bind(device.group_id.0)
        .bind(serde_json::to_string(&device.attributes)?)
        .bind(device.motion.streak)
        .bind(device.motion.state)
        .bind(device.motion.time.map(millis))
        .bind(device.motion.distance)
        .bind(device.motion.position_id.0)
        .bind(device.motion.idle_state)
        .bind(device.motion.idle_time.as_millis() as i64)
        .bind(device.motion.idle_start.map(millis))
        .execute(&self.pool)
        .await?;

        Ok(DeviceId(result.last_insert_rowid()))
    }

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>, Self::Error> {
        let row = sqlx::query("SELECT * FROM devices WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_device).transpose()
    }

    async fn get_device_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<Device>, Self::Error> {
        let row = sqlx::query("SELECT * FROM devices WHERE unique_id = ?")
            .bind(unique_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_device).transpose()
    }

    async fn update_motion_state(
        &self,
        device_id: DeviceId,
        motion: &MotionColumns,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            UPDATE devices SET
                motion_streak = ?, motion_state = ?, motion_time = ?,
                motion_distance = ?, motion_position_id = ?,
                idle_state = ?, idle_time_ms = ?, idle_start = ?
            WHERE id = ?
            "#,
        )
        .bind(motion.streak)
        .bind(motion.state)
        .bind(motion.time.map(millis))
        .bind(motion.distance)
        .bind(motion.position_id.0)
        .bind(motion.idle_state)
        .bind(motion.idle_time.as_millis() as i64)
        .bind(motion.idle_start.map(millis))
        .bind(device_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_position(&self, position: &Position) -> Result<PositionId, Self::Error> {
        let network = position
            .network
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO positions (
                device_id, protocol, server_time, device_time, fix_time,
                valid, latitude, longitude, altitude, speed, course,
                accuracy, address, geofence_ids, attributes, network
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.device_id.0)
        .bind(&position.protocol)
        .bind(millis(position.server_time))
        .bind(millis(position.device_time))
        .bind(millis(position.fix_time))
        .bind(position.valid)
        .bind(position.latitude)
        .bind(position.longitude)
        .bind(position.altitude)
        .bind(position.speed)
        .bind(position.course)
        .bind(position.accuracy)
        .bind(&position.address)
        .bind(serde_json::to_string(&position.geofence_ids)?)
        .bind(serde_json::to_string(&position.attributes)?)
        .bind(network)
        .execute(&self.pool)
        .await?;

        Ok(PositionId(result.last_insert_rowid()))
    }

    async fn latest_position(&self, device_id: DeviceId) -> Result<Option<Position>, Self::Error> {
        let row = sqlx::query(
            "SELECT * FROM positions WHERE device_id = ? ORDER BY fix_time DESC, id DESC LIMIT 1",
        )
        .bind(device_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_position).transpose()
    }

    async fn add_event(&self, event: &Event) -> Result<EventId, Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (
                type, device_id, position_id, event_time,
                geofence_id, maintenance_id, attributes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.event_type)
        .bind(event.device_id.0)
        .bind(event.position_id.0)
        .bind(millis(event.event_time))
        .bind(event.geofence_id.0)
        .bind(event.maintenance_id.0)
        .bind(serde_json::to_string(&event.attributes)?)
        .execute(&self.pool)
        .await?;

        Ok(EventId(result.last_insert_rowid()))
    }

    async fn add_group(&self, group: &Group) -> Result<GroupId, Self::Error> {
        let result =
            sqlx::query("INSERT INTO device_groups (name, group_id, attributes) VALUES (?, ?, ?)")
                .bind(&group.name)
                .bind(group.group_id.0)
                .bind(serde_json::to_string(&group.attributes)?)
                .execute(&self.pool)
                .await?;

        Ok(GroupId(result.last_insert_rowid()))
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, Self::Error> {
        let row = sqlx::query("SELECT * FROM device_groups WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Group {
                id: GroupId(row.try_get("id")?),
                name: row.try_get("name")?,
                group_id: GroupId(row.try_get("group_id")?),
                attributes: serde_json::from_str(row.try_get::<&str, _>("attributes")?)?,
            })),
            None => Ok(None),
        }
    }

    async fn add_geofence(&self, geofence: &Geofence) -> Result<(), Self::Error> {
        let id = (geofence.id.0 != 0).then_some(geofence.id.0);
        sqlx::query("INSERT INTO geofences (id, name, geometry, attributes) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(&geofence.name)
            .bind(serde_json::to_string(&geofence.geometry)?)
            .bind(serde_json::to_string(&geofence.attributes)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_geofences(&self) -> Result<Vec<Geofence>, Self::Error> {
        let rows = sqlx::query("SELECT * FROM geofences ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Geofence {
                    id: GeofenceId(row.try_get("id")?),
                    name: row.try_get("name")?,
                    geometry: serde_json::from_str(row.try_get::<&str, _>("geometry")?)?,
                    attributes: serde_json::from_str(row.try_get::<&str, _>("attributes")?)?,
                })
            })
            .collect()
    }

    async fn add_notification_rule(&self, rule: &NotificationRule) -> Result<(), Self::Error> {
        let id = (rule.id.0 != 0).then_some(rule.id.0);
        sqlx::query(
            r#"
            INSERT INTO notification_rules (id, event_type, geofence_id, channels, min_interval_secs)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&rule.event_type)
        .bind(rule.geofence_id.0)
        .bind(serde_json::to_string(&rule.channels)?)
        .bind(rule.min_interval_secs as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_notification_rules(&self) -> Result<Vec<NotificationRule>, Self::Error> {
        let rows = sqlx::query("SELECT * FROM notification_rules ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(NotificationRule {
                    id: NotificationId(row.try_get("id")?),
                    event_type: row.try_get("event_type")?,
                    geofence_id: GeofenceId(row.try_get("geofence_id")?),
                    channels: serde_json::from_str(row.try_get::<&str, _>("channels")?)?,
                    min_interval_secs: row.try_get::<i64, _>("min_interval_secs")? as u64,
                })
            })
            .collect()
    }

    async fn add_maintenance(&self, maintenance: &Maintenance) -> Result<(), Self::Error> {
        let id = (maintenance.id.0 != 0).then_some(maintenance.id.0);
        sqlx::query(
            "INSERT INTO maintenances (id, name, attribute, start, period) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&maintenance.name)
        .bind(&maintenance.attribute)
        .bind(maintenance.start)
        .bind(maintenance.period)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_maintenances(&self) -> Result<Vec<Maintenance>, Self::Error> {
        let rows = sqlx::query("SELECT * FROM maintenances ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Maintenance {
                    id: MaintenanceId(row.try_get("id")?),
                    name: row.try_get("name")?,
                    attribute: row.try_get("attribute")?,
                    start: row.try_get("start")?,
                    period: row.try_get("period")?,
                })
            })
            .collect()
    }

    async fn add_driver(&self, driver: &Driver) -> Result<(), Self::Error> {
        sqlx::query("INSERT INTO drivers (name, unique_id, attributes) VALUES (?, ?, ?)")
            .bind(&driver.name)
            .bind(&driver.unique_id)
            .bind(serde_json::to_string(&driver.attributes)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_driver_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<Driver>, Self::Error> {
        let row = sqlx::query("SELECT * FROM drivers WHERE unique_id = ?")
            .bind(unique_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Driver {
                id: rastro_core::DriverId(row.try_get("id")?),
                name: row.try_get("name")?,
                unique_id: row.try_get("unique_id")?,
                attributes: serde_json::from_str(row.try_get::<&str, _>("attributes")?)?,
            })),
            None => Ok(None),
        }
    }
}
