use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::SignedDuration;
use rastro_core::{DeviceId, Event, NotificationId, Position};
use tracing::{debug, info, warn};

use crate::cache::DeviceCache;
use crate::error::ChannelError;
use crate::storage::Storage;

/// One way of delivering a notification to the outside world.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name as referenced by notification rules.
    fn name(&self) -> &'static str;

    async fn send(&self, event: &Event, position: &Position) -> Result<(), ChannelError>;
}

/// Matches detected events against notification rules and dispatches to
/// the configured channels.
///
/// Dispatch is fire-and-forget: sends run in their own task and a
/// failing channel is logged, never propagated back into the pipeline.
pub struct Notifier<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    channels: HashMap<&'static str, Arc<dyn NotificationChannel>>,
    /// Last dispatch time per (rule, device), for repeat suppression.
    sent: DashMap<(NotificationId, DeviceId), jiff::Timestamp>,
}

impl<S: Storage> Notifier<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            cache,
            channels: channels
                .into_iter()
                .map(|channel| (channel.name(), channel))
                .collect(),
            sent: DashMap::new(),
        }
    }

    /// Fan one event out to every interested rule's channels.
    pub fn dispatch(&self, event: &Event, position: &Position) {
        for rule in self.cache.notification_rules(event.device_id) {
            if rule.event_type != event.event_type {
                continue;
            }
            if rule.geofence_id.0 != 0 && rule.geofence_id != event.geofence_id {
                continue;
            }
            if !self.mark_sent(&rule, event, position) {
                debug!(
                    device_id = ?event.device_id,
                    rule_id = ?rule.id,
                    "Notification suppressed within repeat interval"
                );
                continue;
            }

            for name in &rule.channels {
                let Some(channel) = self.channels.get(name.as_str()) else {
                    warn!(channel = %name, rule_id = ?rule.id, "Unknown notification channel");
                    continue;
                };
                let channel = Arc::clone(channel);
                let event = event.clone();
                let position = position.clone();
                tokio::spawn(async move {
                    if let Err(error) = channel.send(&event, &position).await {
                        warn!(
                            channel = channel.name(),
                            event_type = %event.event_type,
                            device_id = ?event.device_id,
                            error = %error,
                            "Notification delivery failed"
                        );
                    }
                });
            }
        }
    }

    /// Record the dispatch unless one already happened within the rule's
    /// repeat interval. The ingestion clock is the time source, so the
    /// suppression window is not fooled by back-dated event times.
    fn mark_sent(
        &self,
        rule: &rastro_core::NotificationRule,
        event: &Event,
        position: &Position,
    ) -> bool {
        if rule.min_interval_secs == 0 {
            return true;
        }
        let now = position.server_time;
        let interval = SignedDuration::from_secs(rule.min_interval_secs as i64);
        let key = (rule.id, event.device_id);
        let mut allowed = true;
        self.sent
            .entry(key)
            .and_modify(|last| {
                if now.duration_since(*last) < interval {
                    allowed = false;
                } else {
                    *last = now;
                }
            })
            .or_insert(now);
        allowed
    }
}

/// Writes every notification to the log. Always available; useful as the
/// default sink and in tests.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &Event, position: &Position) -> Result<(), ChannelError> {
        info!(
            event_type = %event.event_type,
            device_id = ?event.device_id,
            position_id = ?event.position_id,
            event_time = %event.event_time,
            latitude = position.latitude,
            longitude = position.longitude,
            "Notification"
        );
        Ok(())
    }
}

/// Posts the event and its position as JSON to a configured URL.
pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &Event, position: &Position) -> Result<(), ChannelError> {
        self.client
            .post(&self.url)
            .json(&serde_json::json!({
                "event": event,
                "position": position,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rastro_core::{GeofenceId, NotificationRule, PositionId};

    use super::*;
    use crate::storage::memory::MemoryStorage;

    struct RecordingChannel {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            "log"
        }

        async fn send(&self, event: &Event, _position: &Position) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(event.event_type.clone());
            Ok(())
        }
    }

    async fn notifier_with_rule(
        rule: NotificationRule,
    ) -> (Arc<Notifier<MemoryStorage>>, Arc<Mutex<Vec<String>>>) {
        let storage = Arc::new(MemoryStorage::default());
        let device = rastro_core::Device::new(rastro_core::DeviceId(0), "t1");
        let device_id = storage.add_device(&device).await.unwrap();
        storage.add_notification_rule(&rule).await.unwrap();

        let cache = Arc::new(DeviceCache::new(storage, Default::default()));
        cache.pin(device_id).await.unwrap();

        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = Arc::new(RecordingChannel { sent: sent.clone() });
        (Arc::new(Notifier::new(cache, vec![channel])), sent)
    }

    fn event(device_id: i64) -> Event {
        Event::new(
            rastro_core::event::TYPE_ALARM,
            DeviceId(device_id),
            PositionId(1),
            jiff::Timestamp::UNIX_EPOCH,
        )
    }

    #[tokio::test]
    async fn matching_rule_dispatches() {
        let (notifier, sent) = notifier_with_rule(NotificationRule {
            id: NotificationId(1),
            event_type: rastro_core::event::TYPE_ALARM.to_owned(),
            geofence_id: GeofenceId(0),
            channels: vec!["log".to_owned()],
            min_interval_secs: 0,
        })
        .await;

        let position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        notifier.dispatch(&event(1), &position);
        tokio::task::yield_now().await;

        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeat_within_interval_is_suppressed() {
        let (notifier, sent) = notifier_with_rule(NotificationRule {
            id: NotificationId(1),
            event_type: rastro_core::event::TYPE_ALARM.to_owned(),
            geofence_id: GeofenceId(0),
            channels: vec!["log".to_owned()],
            min_interval_secs: 600,
        })
        .await;

        let early = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        let late = Position::new(DeviceId(1), jiff::Timestamp::from_second(700).unwrap());

        notifier.dispatch(&event(1), &early);
        notifier.dispatch(&event(1), &early);
        notifier.dispatch(&event(1), &late);
        tokio::task::yield_now().await;

        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn other_event_types_ignored() {
        let (notifier, sent) = notifier_with_rule(NotificationRule {
            id: NotificationId(1),
            event_type: rastro_core::event::TYPE_DEVICE_MOVING.to_owned(),
            geofence_id: GeofenceId(0),
            channels: vec!["log".to_owned()],
            min_interval_secs: 0,
        })
        .await;

        let position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        notifier.dispatch(&event(1), &position);
        tokio::task::yield_now().await;

        assert!(sent.lock().unwrap().is_empty());
    }
}
