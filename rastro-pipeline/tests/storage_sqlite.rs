//! SQLite storage backend tests against a temporary database file.

use std::collections::BTreeMap;

use rastro_core::position::{CellTower, keys};
use rastro_core::{
    Device, DeviceId, Geofence, GeofenceId, MotionColumns, Network, Position, PositionId, Value,
    geo,
};
use rastro_pipeline::Storage;
use rastro_pipeline::storage::sqlite::SqliteStorage;

async fn storage() -> (SqliteStorage, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rastro.db");
    let storage = SqliteStorage::new(path.to_string_lossy().as_ref())
        .await
        .unwrap();
    (storage, dir)
}

fn device_with_attributes() -> Device {
    let mut device = Device::new(DeviceId(0), "8640000123");
    device.name = "Van 7".to_owned();
    device
        .attributes
        .insert("speedLimit".to_owned(), Value::Number(70.0));
    device
}

#[tokio::test]
async fn device_round_trips_with_attributes() {
    let (storage, _dir) = storage().await;

    let id = storage.add_device(&device_with_attributes()).await.unwrap();
    assert_ne!(id.0, 0);

    let loaded = storage.get_device(id).await.unwrap().unwrap();
    assert_eq!(loaded.unique_id, "8640000123");
    assert_eq!(loaded.name, "Van 7");
    assert_eq!(
        loaded.attributes.get("speedLimit"),
        Some(&Value::Number(70.0))
    );

    let by_unique = storage
        .get_device_by_unique_id("8640000123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_unique.id, id);
}

#[tokio::test]
async fn motion_state_update_touches_only_motion_columns() {
    let (storage, _dir) = storage().await;
    let id = storage.add_device(&device_with_attributes()).await.unwrap();

    let motion = MotionColumns {
        streak: true,
        state: true,
        time: Some(jiff::Timestamp::from_second(1_700_000_000).unwrap()),
        distance: 1234.5,
        position_id: PositionId(42),
        idle_state: false,
        idle_time: jiff::SignedDuration::from_secs(90),
        idle_start: None,
    };
    storage.update_motion_state(id, &motion).await.unwrap();

    let loaded = storage.get_device(id).await.unwrap().unwrap();
    assert_eq!(loaded.motion, motion);
    // Everything outside the motion columns is untouched.
    assert_eq!(loaded.name, "Van 7");
    assert_eq!(
        loaded.attributes.get("speedLimit"),
        Some(&Value::Number(70.0))
    );
}

#[tokio::test]
async fn latest_position_is_newest_by_fix_time() {
    let (storage, _dir) = storage().await;
    let id = storage.add_device(&device_with_attributes()).await.unwrap();

    let mut first = Position::new(id, jiff::Timestamp::from_second(100).unwrap());
    first.latitude = 52.5;
    first.longitude = 13.4;
    first.set(keys::IGNITION, true);
    first.network = Some(Network {
        cell_towers: vec![CellTower {
            mcc: 262,
            mnc: 2,
            lac: 1010,
            cid: 26511,
            signal: Some(-61),
        }],
        wifi_access_points: Vec::new(),
    });

    let second = Position::new(id, jiff::Timestamp::from_second(200).unwrap());
    let back_dated = Position::new(id, jiff::Timestamp::from_second(50).unwrap());

    storage.add_position(&first).await.unwrap();
    let second_id = storage.add_position(&second).await.unwrap();
    storage.add_position(&back_dated).await.unwrap();

    let latest = storage.latest_position(id).await.unwrap().unwrap();
    assert_eq!(latest.id, second_id);
    assert_eq!(latest.fix_time, jiff::Timestamp::from_second(200).unwrap());
}

#[tokio::test]
async fn position_attributes_and_network_round_trip() {
    let (storage, _dir) = storage().await;
    let id = storage.add_device(&device_with_attributes()).await.unwrap();

    let mut position = Position::new(id, jiff::Timestamp::from_second(100).unwrap());
    position.set(keys::IGNITION, true);
    position.set(keys::TOTAL_DISTANCE, 1500.25);
    position.set(keys::ALARM, "sos");
    position.geofence_ids = vec![GeofenceId(3)];
    position.address = Some("Somewhere 12".to_owned());

    storage.add_position(&position).await.unwrap();

    let loaded = storage.latest_position(id).await.unwrap().unwrap();
    assert_eq!(loaded.boolean(keys::IGNITION), Some(true));
    assert_eq!(loaded.double(keys::TOTAL_DISTANCE), Some(1500.25));
    assert_eq!(loaded.string(keys::ALARM), Some("sos"));
    assert_eq!(loaded.geofence_ids, vec![GeofenceId(3)]);
    assert_eq!(loaded.address.as_deref(), Some("Somewhere 12"));
}

#[tokio::test]
async fn geofences_round_trip_with_geometry() {
    let (storage, _dir) = storage().await;

    let fence = Geofence {
        id: GeofenceId(7),
        name: "Depot".to_owned(),
        geometry: geo::Geometry::Circle {
            latitude: 52.5,
            longitude: 13.4,
            radius: 250.0,
        },
        attributes: BTreeMap::from([("speedLimit".to_owned(), Value::Number(10.0))]),
    };
    storage.add_geofence(&fence).await.unwrap();

    let listed = storage.list_geofences().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, GeofenceId(7));
    assert!(listed[0].contains(52.5, 13.4));
    assert!(!listed[0].contains(52.6, 13.4));
}
