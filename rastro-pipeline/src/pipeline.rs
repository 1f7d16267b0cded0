use std::sync::Arc;

use rastro_core::{Event, Position};
use tracing::warn;

use crate::cache::DeviceCache;
use crate::config::PipelineConfig;
use crate::events::EventDetector;
use crate::handlers::{Outcome, PositionHandler};
use crate::notify::Notifier;
use crate::providers::Providers;
use crate::storage::Storage;

/// What became of one position after its trip through the chain.
pub struct ProcessReport {
    /// The position as the stages left it, with its storage id assigned
    /// when persistence succeeded.
    pub position: Position,
    /// Whether a stage stopped the chain early. A filtered position was
    /// not persisted and produced no events.
    pub filtered: bool,
    /// Events detected and handed to the notifier.
    pub events: Vec<Event>,
}

/// The per-position processing chain: enrichment stages in fixed order,
/// then event detection, for positions of one pipeline instance.
///
/// The stage order is load-bearing; stages read fields earlier stages
/// wrote. A stage returning `Filtered` stops the chain before
/// persistence. A stage returning an error is logged and treated the
/// same way from that point on, so one bad position can never wedge its
/// device's queue.
pub struct Pipeline<S: Storage> {
    handlers: Vec<Box<dyn PositionHandler>>,
    detectors: Vec<Box<dyn EventDetector>>,
    storage: Arc<S>,
    cache: Arc<DeviceCache<S>>,
    notifier: Arc<Notifier<S>>,
}

impl<S: Storage> Pipeline<S> {
    pub fn new(
        storage: Arc<S>,
        cache: Arc<DeviceCache<S>>,
        providers: Providers,
        notifier: Arc<Notifier<S>>,
        config: &PipelineConfig,
    ) -> Self {
        use crate::events as ev;
        use crate::handlers as h;

        let handlers: Vec<Box<dyn PositionHandler>> = vec![
            Box::new(h::computed::ComputedAttributesHandler::new(
                cache.clone(),
                &config.processing.computed,
                false,
            )),
            Box::new(h::outdated::OutdatedHandler::new(config.time.clone())),
            Box::new(h::time::TimeHandler::new(config.time.clone())),
            Box::new(h::geolocation::GeolocationHandler::new(
                providers.geolocation.clone(),
                config.geolocation.clone(),
            )),
            Box::new(h::hemisphere::HemisphereHandler::new(&config.hemisphere)),
            Box::new(h::distance::DistanceHandler::new(
                cache.clone(),
                config.coordinates.clone(),
            )),
            Box::new(h::filter::FilterHandler::new(
                cache.clone(),
                config.filter.clone(),
            )),
            Box::new(h::geofence::GeofenceHandler::new(cache.clone())),
            Box::new(h::geocode::GeocodeHandler::new(
                providers.geocoder.clone(),
                config.geocode.clone(),
            )),
            Box::new(h::speed_limit::SpeedLimitHandler::new(
                providers.speed_limit.clone(),
            )),
            Box::new(h::motion::MotionHandler::new(config.motion.speed_threshold)),
            Box::new(h::computed::ComputedAttributesHandler::new(
                cache.clone(),
                &config.processing.computed,
                true,
            )),
            Box::new(h::engine_hours::EngineHoursHandler::new(cache.clone())),
            Box::new(h::driver::DriverHandler::new(storage.clone())),
            Box::new(h::copy_attributes::CopyAttributesHandler::new(
                cache.clone(),
                config.processing.copy_attributes.clone(),
            )),
            Box::new(h::forwarding::ForwardingHandler::new(&config.forward)),
            Box::new(h::persistence::PersistenceHandler::new(storage.clone())),
        ];

        let detectors: Vec<Box<dyn EventDetector>> = vec![
            Box::new(ev::alarm::AlarmDetector),
            Box::new(ev::overspeed::OverspeedDetector::new(
                cache.clone(),
                config.overspeed.clone(),
            )),
            Box::new(ev::ignition::IgnitionDetector::new(cache.clone())),
            Box::new(ev::motion::MotionEventDetector::new(
                cache.clone(),
                storage.clone(),
                config.motion.clone(),
            )),
            Box::new(ev::geofence::GeofenceDetector::new(cache.clone())),
            Box::new(ev::driver::DriverDetector::new(cache.clone())),
            Box::new(ev::fuel::FuelDetector::new(cache.clone(), config.fuel.clone())),
            Box::new(ev::maintenance::MaintenanceDetector::new(cache.clone())),
            Box::new(ev::media::MediaDetector),
            Box::new(ev::command_result::CommandResultDetector),
        ];

        Self {
            handlers,
            detectors,
            storage,
            cache,
            notifier,
        }
    }

    pub fn cache(&self) -> &Arc<DeviceCache<S>> {
        &self.cache
    }

    /// Run one position through every stage, then through event
    /// detection. Returns on every path; the caller performs
    /// post-processing (log, acknowledge, advance the queue) exactly
    /// once with the report.
    pub async fn process(&self, mut position: Position) -> ProcessReport {
        let mut filtered = false;

        for handler in &self.handlers {
            match handler.handle(&mut position).await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Filtered) => {
                    filtered = true;
                    break;
                }
                Err(error) => {
                    warn!(
                        device_id = ?position.device_id,
                        stage = handler.name(),
                        error = %error,
                        "Stage failed, skipping the rest of the chain"
                    );
                    filtered = true;
                    break;
                }
            }
        }

        let mut events = Vec::new();
        if !filtered {
            for detector in &self.detectors {
                match detector.analyze(&position).await {
                    Ok(detected) => events.extend(detected),
                    Err(error) => warn!(
                        device_id = ?position.device_id,
                        detector = detector.name(),
                        error = %error,
                        "Event detector failed"
                    ),
                }
            }

            for event in &mut events {
                if event.position_id.0 == 0 {
                    event.position_id = position.id;
                }
                match self.storage.add_event(event).await {
                    Ok(id) => event.id = id,
                    Err(error) => warn!(
                        device_id = ?event.device_id,
                        event_type = %event.event_type,
                        error = %error,
                        "Failed to store event"
                    ),
                }
                self.notifier.dispatch(event, &position);
            }

            // The new reference for the next position's distance, filter
            // and detector comparisons. Filtered positions never advance
            // it.
            self.cache.set_last_position(position.clone());
        }

        ProcessReport {
            position,
            filtered,
            events,
        }
    }
}
