//! Domain events and their delivery to the message broker.
//!
//! Events serialize to JSON with fields in declaration order. Field names are
//! part of the wire contract with consumers and must not change.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod publisher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "kafka")]
pub use kafka::KafkaWriter;
pub use publisher::{Ack, EventPublisher, MessageWriter, OutboundMessage};

pub const TOPIC_BUS_CREATED: &str = "bus.created";
pub const TOPIC_DRIVER_LOCATION_UPDATED: &str = "driver.location.updated";

/// An event with a fixed destination topic.
pub trait PublishableEvent: Serialize + Send + Sync {
    const TOPIC: &'static str;
}

/// Emitted after a bus is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusCreatedEvent {
    pub bus_id: i64,
    pub license_plate: String,
    pub wheelchair_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl PublishableEvent for BusCreatedEvent {
    const TOPIC: &'static str = TOPIC_BUS_CREATED;
}

/// Emitted whenever a driver reports a new position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverLocationUpdatedEvent {
    pub driver_id: i64,
    pub bus_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl PublishableEvent for DriverLocationUpdatedEvent {
    const TOPIC: &'static str = TOPIC_DRIVER_LOCATION_UPDATED;
}
