use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a purchase order. Orders advance one step at a time;
/// `cancelled` absorbs from every state except `received`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "waiting_for_delivery")]
    WaitingForDelivery,
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Validates if a status transition is allowed
    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            // From pending
            (Pending, Sent) => true,
            (Pending, Cancelled) => true,

            // From sent
            (Sent, WaitingForDelivery) => true,
            (Sent, Received) => true,
            (Sent, Cancelled) => true,

            // From waiting_for_delivery
            (WaitingForDelivery, Received) => true,
            (WaitingForDelivery, Cancelled) => true,

            // Allow transitioning to the same status (no-op)
            _ if self == next => true,

            // received and cancelled are terminal
            _ => false,
        }
    }
}

/// Lifecycle of a supplier return. Once shipped the goods are in transit
/// and the return can no longer be cancelled directly; the close step
/// decides the final outcome after the supplier's response.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl ReturnStatus {
    /// Validates if a status transition is allowed
    pub fn can_transition_to(&self, next: &ReturnStatus) -> bool {
        use ReturnStatus::*;
        match (self, next) {
            (Draft, Pending) => true,
            (Draft, Cancelled) => true,

            (Pending, Approved) => true,
            (Pending, Cancelled) => true,

            (Approved, Shipped) => true,
            (Approved, Cancelled) => true,

            // In transit: the only way forward is receiving the response
            (Shipped, Received) => true,

            // Close decides completed (something accepted) or cancelled
            (Received, Completed) => true,
            (Received, Cancelled) => true,

            _ if self == next => true,

            _ => false,
        }
    }

    /// True while the return can still be cancelled (no stock has moved).
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            ReturnStatus::Draft | ReturnStatus::Pending | ReturnStatus::Approved
        )
    }
}

/// Per-line supplier decision on a return. Recorded exactly once, when the
/// return is received back from the supplier.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnItemStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "partial_accept")]
    PartialAccept,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "exchange")]
    Exchange,
}
