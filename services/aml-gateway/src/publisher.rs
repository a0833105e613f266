use crate::domain::{Event, EventPayload};
use crate::errors::GatewayError;
use message_bus::EventBus;
use std::sync::Arc;
use tracing::debug;

/// Wraps payloads into envelopes and publishes them under their type tag
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub async fn publish(&self, payload: EventPayload) -> Result<Event, GatewayError> {
        let event = Event::new(payload);
        let routing_key = event.event_type().routing_key();
        let body = event.encode()?;

        self.bus.publish(routing_key, body).await?;

        debug!(
            event_id = %event.id,
            check_id = %event.payload.check_id(),
            routing_key,
            "Event published"
        );
        Ok(event)
    }
}
