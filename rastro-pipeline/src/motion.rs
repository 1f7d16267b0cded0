//! Trip/parking state machine.
//!
//! `update_state` is a pure function over the device's persisted motion
//! columns and one new position. The caller supplies the instantaneous
//! moving signal, writes the columns back when `changed` is set, and
//! persists the returned event if any.
//!
//! The algorithm is anchor-based: the first position whose moving signal
//! disagrees with the confirmed state opens a candidate streak and
//! becomes the anchor. A trip start is confirmed once both the elapsed
//! time and the distance accumulated since the anchor reach their
//! minimums; a stop is confirmed on elapsed time alone (or immediately
//! on ignition-off in ignition mode), since distance cannot accumulate
//! while parked. Confirmed transitions emit exactly one event,
//! timestamped at the anchor, not at the confirming position.

use jiff::SignedDuration;
use rastro_core::position::keys;
use rastro_core::{Event, MotionColumns, Position, PositionId, event};

use crate::config::MotionConfig;

pub struct MotionOutcome {
    pub event: Option<Event>,
    /// Whether the columns changed and need to be written back.
    pub changed: bool,
}

pub fn update_state(
    columns: &mut MotionColumns,
    last: Option<&Position>,
    position: &Position,
    moving: bool,
    config: &MotionConfig,
) -> MotionOutcome {
    let mut changed = false;

    if let Some(last) = last {
        changed |= accumulate_idle(columns, last, position, config);

        // A long silence invalidates any open candidate: confirming a
        // transition across an outage would stamp an event before data
        // existed to support it.
        let gap = position.fix_time.duration_since(last.fix_time);
        if config.no_data_gap_secs > 0 && gap >= config.no_data_gap() && columns.streak {
            clear_streak(columns);
            reset_idle(columns);
            return MotionOutcome {
                event: None,
                changed: true,
            };
        }
    }

    if moving == columns.state {
        if columns.streak {
            // The device returned to its confirmed state before the
            // candidate crossed the thresholds.
            clear_streak(columns);
            changed = true;
        }
    } else if !columns.streak {
        columns.streak = true;
        columns.time = Some(position.fix_time);
        columns.distance = position.double(keys::TOTAL_DISTANCE).unwrap_or(0.0);
        columns.position_id = position.id;
        changed = true;
    } else {
        let anchor_time = columns.time.unwrap_or(position.fix_time);
        let elapsed = position.fix_time.duration_since(anchor_time);
        let distance = position.double(keys::TOTAL_DISTANCE).unwrap_or(0.0) - columns.distance;
        let ignition_off = config.use_ignition && position.boolean(keys::IGNITION) == Some(false);

        let confirmed = if moving {
            elapsed >= config.min_trip_duration() && distance >= config.min_trip_distance
        } else {
            elapsed >= config.min_parking_duration() || ignition_off
        };

        if confirmed {
            let event_type = if moving {
                event::TYPE_DEVICE_MOVING
            } else {
                event::TYPE_DEVICE_STOPPED
            };
            let mut event = Event::new(
                event_type,
                position.device_id,
                columns.position_id,
                anchor_time,
            );
            if !moving {
                // Odometer snapshot at trip end; consumers derive the
                // trip distance by diffing successive stop events.
                event.set(
                    keys::TOTAL_DISTANCE,
                    position.double(keys::TOTAL_DISTANCE).unwrap_or(0.0),
                );
                if columns.idle_time > SignedDuration::ZERO {
                    event.set(keys::IDLE_TIME, columns.idle_time.as_millis() as i64);
                }
            }

            columns.state = moving;
            clear_streak(columns);
            reset_idle(columns);

            return MotionOutcome {
                event: Some(event),
                changed: true,
            };
        }
    }

    MotionOutcome {
        event: None,
        changed,
    }
}

fn clear_streak(columns: &mut MotionColumns) {
    columns.streak = false;
    columns.time = None;
    columns.distance = 0.0;
    columns.position_id = PositionId(0);
}

fn reset_idle(columns: &mut MotionColumns) {
    columns.idle_state = false;
    columns.idle_time = SignedDuration::ZERO;
    columns.idle_start = None;
}

/// Track engine-on-while-stationary time between consecutive positions.
/// Returns whether any idle column changed.
fn accumulate_idle(
    columns: &mut MotionColumns,
    last: &Position,
    position: &Position,
    config: &MotionConfig,
) -> bool {
    let ignition = position.boolean(keys::IGNITION);
    let motion = position.boolean(keys::MOTION);
    let rpm = position.double(keys::RPM);

    let engine_running = rpm.is_some_and(|rpm| rpm > config.idle_rpm_threshold)
        || ignition == Some(true);
    let is_idle = engine_running && motion == Some(false);

    let duration = position.fix_time.duration_since(last.fix_time);
    let was_idle = columns.idle_state;

    if was_idle && is_idle {
        // Gaps longer than the configured maximum are offline periods,
        // not idling.
        if duration > SignedDuration::ZERO && duration < config.idle_max_gap() {
            columns.idle_time += duration;
            return true;
        }
        false
    } else if !was_idle && is_idle {
        columns.idle_state = true;
        columns.idle_start = Some(position.fix_time);
        true
    } else if was_idle && !is_idle {
        if let Some(start) = columns.idle_start {
            let total = position.fix_time.duration_since(start);
            if total < config.idle_min_duration() {
                columns.idle_time = (columns.idle_time - total).max(SignedDuration::ZERO);
            }
        }
        columns.idle_state = false;
        columns.idle_start = None;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::geo;
    use rastro_core::{DeviceId, PositionId};

    fn config() -> MotionConfig {
        MotionConfig {
            min_trip_duration_secs: 300,
            min_trip_distance: 500.0,
            min_parking_duration_secs: 300,
            no_data_gap_secs: 3600,
            ..MotionConfig::default()
        }
    }

    fn position(seconds: i64, total_distance: f64, id: i64) -> Position {
        let mut position = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(seconds).unwrap(),
        );
        position.id = PositionId(id);
        position.set(keys::TOTAL_DISTANCE, total_distance);
        position
    }

    #[test]
    fn trip_confirmed_after_distance_and_duration() {
        let config = config();
        let mut columns = MotionColumns::default();

        // Stationary anchor candidate opens on the first moving fix.
        let p1 = position(0, 0.0, 11);
        let outcome = update_state(&mut columns, None, &p1, true, &config);
        assert!(outcome.event.is_none());
        assert!(outcome.changed);
        assert!(columns.streak);
        assert_eq!(columns.position_id, PositionId(11));

        // 600 m and 300 s later both thresholds are crossed.
        let p2 = position(300, 600.0, 12);
        let outcome = update_state(&mut columns, Some(&p1), &p2, true, &config);
        let event = outcome.event.expect("moving event");
        assert_eq!(event.event_type, event::TYPE_DEVICE_MOVING);
        assert_eq!(event.event_time, p1.fix_time);
        assert_eq!(event.position_id, PositionId(11));
        assert!(columns.state);
        assert!(!columns.streak);
    }

    #[test]
    fn no_trip_below_distance_threshold() {
        let config = config();
        let mut columns = MotionColumns::default();

        let p1 = position(0, 0.0, 1);
        update_state(&mut columns, None, &p1, true, &config);

        let p2 = position(600, 300.0, 2);
        let outcome = update_state(&mut columns, Some(&p1), &p2, true, &config);
        assert!(outcome.event.is_none());
        assert!(columns.streak, "candidate stays open");
        assert!(!columns.state);
    }

    #[test]
    fn stop_confirmed_after_parking_duration() {
        let config = config();
        let mut columns = MotionColumns {
            state: true,
            ..MotionColumns::default()
        };

        let p1 = position(0, 1000.0, 1);
        let outcome = update_state(&mut columns, None, &p1, false, &config);
        assert!(outcome.event.is_none());
        assert!(columns.streak);

        let p2 = position(300, 1000.0, 2);
        let outcome = update_state(&mut columns, Some(&p1), &p2, false, &config);
        let event = outcome.event.expect("stopped event");
        assert_eq!(event.event_type, event::TYPE_DEVICE_STOPPED);
        assert_eq!(event.event_time, p1.fix_time);
        assert!(!columns.state);
    }

    #[test]
    fn ignition_off_confirms_stop_immediately() {
        let config = MotionConfig {
            use_ignition: true,
            ..config()
        };
        let mut columns = MotionColumns {
            state: true,
            ..MotionColumns::default()
        };

        let p1 = position(0, 1000.0, 1);
        update_state(&mut columns, None, &p1, false, &config);

        let mut p2 = position(30, 1000.0, 2);
        p2.set(keys::IGNITION, false);
        let outcome = update_state(&mut columns, Some(&p1), &p2, false, &config);
        assert_eq!(
            outcome.event.expect("stopped event").event_type,
            event::TYPE_DEVICE_STOPPED
        );
    }

    #[test]
    fn candidate_aborts_when_device_returns_to_confirmed_state() {
        let config = config();
        let mut columns = MotionColumns::default();

        let p1 = position(0, 0.0, 1);
        update_state(&mut columns, None, &p1, true, &config);
        assert!(columns.streak);

        let p2 = position(60, 100.0, 2);
        let outcome = update_state(&mut columns, Some(&p1), &p2, false, &config);
        assert!(outcome.event.is_none());
        assert!(!columns.streak);
        assert!(!columns.state);
    }

    #[test]
    fn data_gap_resets_streak_without_event() {
        let config = config();
        let mut columns = MotionColumns::default();

        let p1 = position(0, 0.0, 1);
        update_state(&mut columns, None, &p1, true, &config);
        assert!(columns.streak);

        // Two hours of silence, then a fix that would otherwise satisfy
        // both thresholds.
        let p2 = position(7200, 5000.0, 2);
        let outcome = update_state(&mut columns, Some(&p1), &p2, true, &config);
        assert!(outcome.event.is_none());
        assert!(!columns.streak);
        assert!(outcome.changed);
    }

    #[test]
    fn idle_time_attached_to_stop_event() {
        let config = MotionConfig {
            idle_min_duration_secs: 0,
            ..config()
        };
        let mut columns = MotionColumns {
            state: true,
            ..MotionColumns::default()
        };

        let mut p1 = position(0, 1000.0, 1);
        p1.set(keys::IGNITION, true);
        p1.set(keys::MOTION, false);
        update_state(&mut columns, None, &p1, false, &config);
        assert!(columns.idle_state);

        let mut p2 = position(120, 1000.0, 2);
        p2.set(keys::IGNITION, true);
        p2.set(keys::MOTION, false);
        let outcome = update_state(&mut columns, Some(&p1), &p2, false, &config);
        assert!(outcome.event.is_none());
        assert_eq!(columns.idle_time, SignedDuration::from_secs(120));

        let mut p3 = position(300, 1000.0, 3);
        p3.set(keys::IGNITION, true);
        p3.set(keys::MOTION, false);
        let outcome = update_state(&mut columns, Some(&p2), &p3, false, &config);
        let event = outcome.event.expect("stopped event");
        assert_eq!(event.integer(keys::IDLE_TIME), Some(300_000));
        assert_eq!(columns.idle_time, SignedDuration::ZERO);
    }

    #[test]
    fn longitude_delta_fixture_crosses_distance_threshold() {
        // Sanity-check the fixture helper used by integration tests.
        let delta = geo::longitude_delta(600.0, 0.0);
        assert!(geo::distance(0.0, 0.0, 0.0, delta) >= 599.0);
    }
}
