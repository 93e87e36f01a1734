use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::domain::aggregates::StockChange;
use crate::domain::events::DomainEvent;

/// Publishes domain events to NATS when connected. Every event is logged either way.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
    recorded: Option<Arc<Mutex<Vec<DomainEvent>>>>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats, recorded: None }
    }

    /// Keeps published events in memory so callers can inspect them.
    pub fn recording() -> Self {
        Self { nats: None, recorded: Some(Arc::new(Mutex::new(Vec::new()))) }
    }

    pub fn recorded(&self) -> Vec<DomainEvent> {
        self.recorded
            .as_ref()
            .and_then(|r| r.lock().ok().map(|events| events.clone()))
            .unwrap_or_default()
    }

    pub async fn publish(&self, event: DomainEvent) {
        info!(subject = event.subject(), event = ?event, "domain event");
        if let Some(client) = &self.nats {
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                        warn!(subject = event.subject(), error = %e, "failed to publish event");
                    }
                }
                Err(e) => warn!(subject = event.subject(), error = %e, "failed to encode event"),
            }
        }
        if let Some(recorded) = &self.recorded {
            if let Ok(mut events) = recorded.lock() {
                events.push(event);
            }
        }
    }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Emits `StockLow` / `StockDepleted` for changes that crossed a threshold.
    pub async fn stock_changes(&self, changes: &[StockChange]) {
        for change in changes {
            if change.depleted() {
                self.publish(DomainEvent::StockDepleted { product_id: change.product_id }).await;
            } else if change.became_low() {
                self.publish(DomainEvent::StockLow {
                    product_id: change.product_id,
                    stock: change.current,
                    threshold: change.threshold,
                })
                .await;
            }
        }
    }
}
