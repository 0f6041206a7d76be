use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::{OrderStatus, PaymentStatus};

/// Domain events emitted by the services after a state change is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: String,
        user_id: String,
        total_amount: Decimal,
    },
    OrderFinalized {
        order_id: String,
        payment_id: String,
    },
    OrderPaymentFailed {
        order_id: String,
        reason: String,
    },
    OrderStatusChanged {
        order_id: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Catalog events
    StockAdjusted {
        product_id: String,
        delta: i64,
        new_stock: u32,
    },
    ProductCreated(String),
    ProductUpdated(String),
    ProductDeleted(String),

    // Cart events
    CartCleared(String),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::OrderFinalized { .. } => "order_finalized",
            Event::OrderPaymentFailed { .. } => "order_payment_failed",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::ProductCreated(_) => "product_created",
            Event::ProductUpdated(_) => "product_updated",
            Event::ProductDeleted(_) => "product_deleted",
            Event::CartCleared(_) => "cart_cleared",
        }
    }
}

/// Event plus the moment it was emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: Event,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<EventEnvelope>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<EventEnvelope>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(EventEnvelope {
                event,
                occurred_at: Utc::now(),
            })
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Send, logging instead of failing when the processor is gone. Events
    /// are notifications; losing one never fails the operation that emitted it.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

/// Create a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<EventEnvelope>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drain the channel, logging every event, until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<EventEnvelope>) {
    info!("Starting event processing loop");

    while let Some(EventEnvelope { event, occurred_at }) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                total_amount,
            } => {
                info!(%order_id, %user_id, %total_amount, %occurred_at, "order created");
            }
            Event::OrderFinalized {
                order_id,
                payment_id,
            } => {
                info!(
                    %order_id,
                    %payment_id,
                    payment_status = %PaymentStatus::Completed,
                    %occurred_at,
                    "order finalized"
                );
            }
            Event::OrderPaymentFailed { order_id, reason } => {
                warn!(%order_id, %reason, %occurred_at, "order payment failed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, %occurred_at, "order status changed");
            }
            Event::StockAdjusted {
                product_id,
                delta,
                new_stock,
            } => {
                info!(%product_id, delta, new_stock, %occurred_at, "stock adjusted");
            }
            other => {
                info!(event = other.name(), payload = ?other, %occurred_at, "domain event");
            }
        }
    }

    warn!("Event processing loop has ended");
}
