use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::{CostCategory, CostTarget, PenStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes an event for a write that has already committed.
    ///
    /// A closed channel only produces a warning: the committed state stays as it is.
    pub async fn publish(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Domain event dropped");
        }
    }
}

/// Domain events, emitted after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    LotAllocated {
        lot_id: Uuid,
        allocations: Vec<Uuid>,
        quantity: i32,
    },
    AllocationRemoved {
        allocation_id: Uuid,
        lot_id: Uuid,
        pen_id: Uuid,
        quantity: i32,
    },
    AnimalsTransferred {
        lot_id: Uuid,
        from_pen_id: Uuid,
        to_pen_id: Uuid,
        quantity: i32,
    },
    PenStatusChanged {
        pen_id: Uuid,
        old_status: PenStatus,
        new_status: PenStatus,
    },
    CostPosted {
        batch_id: Uuid,
        target: CostTarget,
        category: CostCategory,
        amount: Decimal,
        lots: Vec<Uuid>,
    },
    MortalityRecorded {
        lot_id: Uuid,
        pen_id: Option<Uuid>,
        quantity: i32,
    },
    SaleRecorded {
        lot_id: Uuid,
        sale_id: Uuid,
        quantity: i32,
        total_value: Decimal,
    },
    LotReceived {
        lot_id: Uuid,
        received_quantity: i32,
        received_at: DateTime<Utc>,
    },
    LotClosed(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::LotAllocated { .. } => "lot_allocated",
            Event::AllocationRemoved { .. } => "allocation_removed",
            Event::AnimalsTransferred { .. } => "animals_transferred",
            Event::PenStatusChanged { .. } => "pen_status_changed",
            Event::CostPosted { .. } => "cost_posted",
            Event::MortalityRecorded { .. } => "mortality_recorded",
            Event::SaleRecorded { .. } => "sale_recorded",
            Event::LotReceived { .. } => "lot_received",
            Event::LotClosed(_) => "lot_closed",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("feedlot_events.processed", 1, "event" => event.name());

        match &event {
            Event::PenStatusChanged {
                pen_id,
                old_status,
                new_status,
            } => {
                info!(pen_id = %pen_id, ?old_status, ?new_status, "Pen status changed");
            }
            Event::MortalityRecorded {
                lot_id, quantity, ..
            } => {
                info!(lot_id = %lot_id, quantity, "Mortality recorded");
            }
            Event::LotClosed(lot_id) => {
                info!(lot_id = %lot_id, "Lot closed");
            }
            other => {
                debug!(event = other.name(), payload = ?other, "Domain event");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_events_reach_the_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let lot_id = Uuid::new_v4();

        sender.publish(Event::LotClosed(lot_id)).await;

        assert_eq!(rx.recv().await, Some(Event::LotClosed(lot_id)));
    }

    #[tokio::test]
    async fn publish_on_closed_channel_does_not_fail() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::LotClosed(Uuid::nil())).await.is_err());
        sender.publish(Event::LotClosed(Uuid::nil())).await;
    }
}
