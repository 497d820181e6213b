//! Invoice document rendering.
//!
//! A fully received purchase order can be printed as an invoice. The data
//! is assembled once (`InvoiceData`) and rendered either as an HTML page
//! for the browser's print view or as a PDF built from content streams.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub mod html;
pub mod pdf;

pub use html::render_invoice_html;
pub use pdf::render_invoice_pdf;

/// One party printed on an invoice (the buying company or the supplier)
#[derive(Debug, Clone, Default)]
pub struct InvoiceParty {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// One invoice line, derived from an order item and its product
#[derive(Debug, Clone)]
pub struct InvoiceLine {
    pub sku: String,
    pub description: String,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
}

/// Everything the renderers need to lay out an invoice
#[derive(Debug, Clone)]
pub struct InvoiceData {
    pub invoice_number: String,
    pub invoice_date: DateTime<Utc>,
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub company: InvoiceParty,
    pub supplier: InvoiceParty,
    pub currency: String,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
}

/// Suggested filename for a downloaded invoice PDF
pub fn invoice_filename(invoice_number: &str) -> String {
    format!("{}.pdf", invoice_number)
}

/// Formats a monetary amount with exactly two decimal places
pub(crate) fn format_amount(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// Formats a fractional tax rate as a percentage, e.g. `0.08` as `8%`
pub(crate) fn format_percent(rate: Decimal) -> String {
    format!("{}%", (rate * dec!(100)).normalize())
}

pub(crate) fn format_date(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_always_carry_two_decimals() {
        assert_eq!(format_amount(dec!(7)), "7.00");
        assert_eq!(format_amount(dec!(12.3)), "12.30");
        assert_eq!(format_amount(dec!(12.346)), "12.35");
    }

    #[test]
    fn percent_drops_trailing_zeros() {
        assert_eq!(format_percent(dec!(0.08)), "8%");
        assert_eq!(format_percent(dec!(0.075)), "7.5%");
        assert_eq!(format_percent(Decimal::ZERO), "0%");
    }

    #[test]
    fn filename_follows_the_invoice_number() {
        assert_eq!(invoice_filename("INV-2026-000042"), "INV-2026-000042.pdf");
    }
}
