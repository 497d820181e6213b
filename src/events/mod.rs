use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

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
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Purchase order events
    PurchaseOrderCreated(Uuid),
    PurchaseOrderUpdated(Uuid),
    PurchaseOrderDeleted(Uuid),
    PurchaseOrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PurchaseOrderReceived {
        order_id: Uuid,
        fully_received: bool,
    },

    // Supplier return events
    ReturnCreated(Uuid),
    ReturnSubmitted(Uuid),
    ReturnApproved(Uuid),
    ReturnRejected(Uuid),
    ReturnShipped(Uuid),
    ReturnReceived(Uuid),
    ReturnClosed {
        return_id: Uuid,
        credit_amount: rust_decimal::Decimal,
    },
    ReturnCancelled(Uuid),

    // Supplier events
    SupplierCreated(Uuid),
    SupplierUpdated(Uuid),
    SupplierDeactivated(Uuid),

    // Product and stock events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    StockAdjusted {
        product_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        min_stock_level: i32,
        reason: String,
    },

    // Document events
    InvoiceGenerated {
        order_id: Uuid,
        invoice_number: String,
    },

    // Auth events
    UserLoggedIn(Uuid),

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Function to process incoming events. Handlers here are side effects that
// must not block request handling; failures are logged and dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::StockAdjusted {
                product_id,
                old_quantity,
                new_quantity,
                min_stock_level,
                reason,
            } => {
                if let Err(e) = handle_stock_adjusted(
                    product_id,
                    old_quantity,
                    new_quantity,
                    min_stock_level,
                    &reason,
                )
                .await
                {
                    error!(
                        "Failed to handle stock adjustment: product_id={}, error={}",
                        product_id, e
                    );
                }
            }
            Event::PurchaseOrderReceived {
                order_id,
                fully_received,
            } => {
                if let Err(e) = handle_purchase_order_received(order_id, fully_received).await {
                    error!(
                        "Failed to handle purchase order receipt: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::ReturnClosed {
                return_id,
                credit_amount,
            } => {
                info!(
                    "Supplier return {} closed with credit amount {}",
                    return_id, credit_amount
                );
            }
            Event::ReturnRejected(return_id) => {
                warn!("Supplier return {} was rejected", return_id);
            }
            Event::InvoiceGenerated {
                order_id,
                invoice_number,
            } => {
                info!(
                    "Invoice {} generated for purchase order {}",
                    invoice_number, order_id
                );
            }
            Event::UserLoggedIn(user_id) => {
                info!("User {} logged in", user_id);
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_stock_adjusted(
    product_id: Uuid,
    old_quantity: i32,
    new_quantity: i32,
    min_stock_level: i32,
    reason: &str,
) -> Result<(), String> {
    info!(
        "Processing stock adjustment: product={}, old_quantity={}, new_quantity={}, reason={}",
        product_id, old_quantity, new_quantity, reason
    );

    if new_quantity <= min_stock_level {
        warn!(
            "Low stock alert: product {} is at {} units (minimum level {})",
            product_id, new_quantity, min_stock_level
        );
        // Surfaces in the low-stock report; reordering stays a manual step
    }

    Ok(())
}

async fn handle_purchase_order_received(
    order_id: Uuid,
    fully_received: bool,
) -> Result<(), String> {
    if fully_received {
        info!(
            "Purchase order {} fully received, invoice assignment pending",
            order_id
        );
    } else {
        info!("Purchase order {} partially received", order_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_sender_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        let order_id = Uuid::new_v4();
        sender
            .send(Event::PurchaseOrderCreated(order_id))
            .await
            .unwrap();

        match rx.recv().await {
            Some(Event::PurchaseOrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn event_sender_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender.send(Event::with_data("orphaned".to_string())).await;
        assert!(result.is_err());
    }
}
