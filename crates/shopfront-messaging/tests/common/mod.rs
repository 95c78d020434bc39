//! Shared fixtures for the messaging integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::event::{EventMetadata, IntegrationEvent};
use shopfront_core::repository::{InboxRow, OutboxRow};
use shopfront_messaging::EventCodec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReserved {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub sku: String,
    pub quantity: u32,
}

impl IntegrationEvent for StockReserved {
    const EVENT_TYPE: &'static str = "inventory.stock_reserved";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub sku: String,
}

impl IntegrationEvent for StockReleased {
    const EVENT_TYPE: &'static str = "inventory.stock_released";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

pub fn codec() -> EventCodec {
    EventCodec::with_events(|registry| {
        registry.register::<StockReserved>(false)?;
        registry.register::<StockReleased>(false)
    })
    .unwrap()
}

pub fn reserved(sku: &str, minutes: i64) -> StockReserved {
    StockReserved {
        metadata: EventMetadata::for_event::<StockReserved>(
            base_time() + Duration::minutes(minutes),
            Some(format!("corr-{sku}")),
        ),
        sku: sku.to_owned(),
        quantity: 1,
    }
}

pub fn outbox_row(codec: &EventCodec, event: &StockReserved) -> OutboxRow {
    OutboxRow::new(
        event.metadata.message_id,
        StockReserved::EVENT_TYPE,
        codec.serialize(event).unwrap(),
        event.metadata.occurred_at_utc,
    )
}

pub fn inbox_row(codec: &EventCodec, event: &StockReserved) -> InboxRow {
    InboxRow {
        id: event.metadata.message_id,
        event_type: StockReserved::EVENT_TYPE.to_owned(),
        payload: codec.serialize(event).unwrap(),
        timestamp: event.metadata.occurred_at_utc,
    }
}
