use chrono::{Datelike, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait, EntityTrait, QuerySelect};
use tracing::debug;

use crate::entities::document_counter::{self, Entity as DocumentCounterEntity};
use crate::errors::ServiceError;

pub const DOC_TYPE_PURCHASE_ORDER: &str = "PO";
pub const DOC_TYPE_SUPPLIER_RETURN: &str = "SR";
pub const DOC_TYPE_INVOICE: &str = "INV";

/// Allocates the next document number for `doc_type`, e.g. `PO-2026-000042`.
///
/// Counters are scoped per document type and calendar year, so every sequence
/// restarts at 1 in January. Callers must run this inside the transaction that
/// persists the numbered document; the exclusive row lock serializes
/// concurrent allocations on Postgres (SQLite serializes writers itself).
pub async fn next_document_number<C>(conn: &C, doc_type: &str) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
{
    let year = Utc::now().year();
    let counter = DocumentCounterEntity::find_by_id((doc_type.to_string(), year))
        .lock_exclusive()
        .one(conn)
        .await?;

    let sequence = match counter {
        Some(row) => {
            let next = row.last_value + 1;
            let mut active: document_counter::ActiveModel = row.into();
            active.last_value = Set(next);
            active.update(conn).await?;
            next
        }
        None => {
            document_counter::ActiveModel {
                doc_type: Set(doc_type.to_string()),
                year: Set(year),
                last_value: Set(1),
            }
            .insert(conn)
            .await?;
            1
        }
    };

    debug!(doc_type, year, sequence, "allocated document number");
    Ok(format_document_number(doc_type, year, sequence))
}

fn format_document_number(doc_type: &str, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:06}", doc_type, year, sequence)
}
