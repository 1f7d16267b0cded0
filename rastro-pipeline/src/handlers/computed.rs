use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::{Position, Value};
use tracing::warn;

use crate::cache::DeviceCache;
use crate::config::ComputedAttribute;
use crate::error::HandlerError;
use crate::expr::Expression;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Evaluates user-defined expressions against each position.
///
/// Two instances run in the chain: an early one whose results can feed
/// the filtering and enrichment stages, and a late one that can read
/// fields those stages computed. A failing expression is logged and
/// skipped; it never filters the position.
pub struct ComputedAttributesHandler<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    attributes: Vec<(String, Expression)>,
    late: bool,
}

impl<S: Storage> ComputedAttributesHandler<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, config: &[ComputedAttribute], late: bool) -> Self {
        let mut attributes = Vec::new();
        for definition in config.iter().filter(|definition| definition.late == late) {
            match Expression::parse(&definition.expression) {
                Ok(expression) => attributes.push((definition.attribute.clone(), expression)),
                Err(error) => warn!(
                    attribute = %definition.attribute,
                    error = %error,
                    "Ignoring invalid computed attribute expression"
                ),
            }
        }
        Self {
            cache,
            attributes,
            late,
        }
    }

    fn apply(&self, position: &mut Position, attribute: &str, value: Value) {
        match attribute {
            "valid" => match value.as_bool() {
                Some(valid) => position.valid = valid,
                None => warn!(attribute, "Computed value is not a boolean"),
            },
            "latitude" | "longitude" | "altitude" | "speed" | "course" | "accuracy" => {
                match value.as_f64() {
                    Some(number) => match attribute {
                        "latitude" => position.latitude = number,
                        "longitude" => position.longitude = number,
                        "altitude" => position.altitude = number,
                        "speed" => position.speed = number,
                        "course" => position.course = number,
                        _ => position.accuracy = number,
                    },
                    None => warn!(attribute, "Computed value is not a number"),
                }
            }
            "address" => match value {
                Value::String(address) => position.address = Some(address),
                _ => warn!(attribute, "Computed value is not a string"),
            },
            _ => {
                position.attributes.insert(attribute.to_owned(), value);
            }
        }
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for ComputedAttributesHandler<S> {
    fn name(&self) -> &'static str {
        if self.late {
            "computed-late"
        } else {
            "computed-early"
        }
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        for (attribute, expression) in &self.attributes {
            let result = expression.evaluate(&|name| resolve(&self.cache, position, name));
            match result {
                Ok(value) => self.apply(position, attribute, value),
                Err(error) => warn!(
                    device_id = ?position.device_id,
                    attribute = %attribute,
                    error = %error,
                    "Attribute computation failed"
                ),
            }
        }
        Ok(Outcome::Continue)
    }
}

fn resolve<S: Storage>(
    cache: &DeviceCache<S>,
    position: &Position,
    name: &str,
) -> Option<Value> {
    if let Some(value) = position.attributes.get(name) {
        return Some(value.clone());
    }
    match name {
        "valid" => Some(Value::Bool(position.valid)),
        "latitude" => Some(Value::Number(position.latitude)),
        "longitude" => Some(Value::Number(position.longitude)),
        "altitude" => Some(Value::Number(position.altitude)),
        "speed" => Some(Value::Number(position.speed)),
        "course" => Some(Value::Number(position.course)),
        "accuracy" => Some(Value::Number(position.accuracy)),
        "protocol" => Some(Value::String(position.protocol.clone())),
        _ => cache.lookup_attribute(position.device_id, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::DeviceId;

    use crate::storage::memory::MemoryStorage;

    fn cache() -> Arc<DeviceCache<MemoryStorage>> {
        Arc::new(DeviceCache::new(
            Arc::new(MemoryStorage::default()),
            Default::default(),
        ))
    }

    fn definition(attribute: &str, expression: &str) -> ComputedAttribute {
        ComputedAttribute {
            attribute: attribute.to_owned(),
            expression: expression.to_owned(),
            late: false,
        }
    }

    #[tokio::test]
    async fn computed_attribute_lands_in_map() {
        let handler = ComputedAttributesHandler::new(
            cache(),
            &[definition("speedKph", "speed * 1.852")],
            false,
        );

        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.speed = 10.0;

        handler.handle(&mut position).await.unwrap();

        assert_eq!(position.double("speedKph"), Some(18.52));
    }

    #[tokio::test]
    async fn well_known_name_updates_field() {
        let handler =
            ComputedAttributesHandler::new(cache(), &[definition("valid", "speed > 1")], false);

        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.speed = 0.0;
        position.valid = true;

        handler.handle(&mut position).await.unwrap();

        assert!(!position.valid);
    }

    #[tokio::test]
    async fn failing_expression_is_skipped() {
        let handler =
            ComputedAttributesHandler::new(cache(), &[definition("x", "missing + 1")], false);

        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        handler.handle(&mut position).await.unwrap();

        assert!(!position.has_attribute("x"));
    }
}
