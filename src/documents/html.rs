//! String-built HTML rendering of an invoice, served for the browser's
//! print view.

use super::{format_amount, format_date, format_percent, InvoiceData, InvoiceParty};

const STYLE: &str = "\
body { font-family: Helvetica, Arial, sans-serif; font-size: 13px; color: #222; margin: 0; }
.sheet { max-width: 760px; margin: 24px auto; padding: 32px; }
header { display: flex; justify-content: space-between; margin-bottom: 32px; }
h1 { font-size: 22px; margin: 0 0 4px 0; }
h2 { font-size: 26px; letter-spacing: 2px; margin: 0 0 8px 0; text-align: right; }
h3 { font-size: 12px; text-transform: uppercase; letter-spacing: 1px; color: #666; margin: 0 0 4px 0; }
p { margin: 0; line-height: 1.5; }
.meta table { border-collapse: collapse; }
.meta th { text-align: left; padding-right: 12px; color: #666; font-weight: normal; }
.meta td { text-align: right; }
.supplier { margin-bottom: 24px; }
table.lines { width: 100%; border-collapse: collapse; margin-bottom: 16px; }
table.lines th { text-align: left; border-bottom: 2px solid #222; padding: 6px 8px; font-size: 11px; text-transform: uppercase; }
table.lines td { border-bottom: 1px solid #ddd; padding: 6px 8px; }
.num { text-align: right; }
table.totals { margin-left: auto; border-collapse: collapse; }
table.totals th { text-align: left; padding: 4px 24px 4px 8px; font-weight: normal; color: #666; }
table.totals td { text-align: right; padding: 4px 8px; }
table.totals tr.grand th, table.totals tr.grand td { border-top: 2px solid #222; font-weight: bold; color: #222; }
.notes { margin-top: 24px; }
@media print { .sheet { margin: 0; padding: 0; } }
";

/// Renders the invoice as a standalone HTML document.
pub fn render_invoice_html(invoice: &InvoiceData) -> String {
    let mut html = String::with_capacity(8 * 1024);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>Invoice {}</title>\n",
        escape_html(&invoice.invoice_number)
    ));
    html.push_str("<style>\n");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n<div class=\"sheet\">\n");

    html.push_str("<header>\n<div class=\"company\">\n");
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(&invoice.company.name)));
    html.push_str(&format!("<p>{}</p>\n", party_contact_html(&invoice.company)));
    html.push_str("</div>\n<div class=\"meta\">\n<h2>INVOICE</h2>\n<table>\n");
    html.push_str(&format!(
        "<tr><th>Invoice #</th><td>{}</td></tr>\n",
        escape_html(&invoice.invoice_number)
    ));
    html.push_str(&format!(
        "<tr><th>Invoice date</th><td>{}</td></tr>\n",
        format_date(invoice.invoice_date)
    ));
    html.push_str(&format!(
        "<tr><th>Order #</th><td>{}</td></tr>\n",
        escape_html(&invoice.order_number)
    ));
    html.push_str(&format!(
        "<tr><th>Order date</th><td>{}</td></tr>\n",
        format_date(invoice.order_date)
    ));
    html.push_str("</table>\n</div>\n</header>\n");

    html.push_str("<section class=\"supplier\">\n<h3>Supplier</h3>\n");
    html.push_str(&format!(
        "<p><strong>{}</strong><br>{}</p>\n",
        escape_html(&invoice.supplier.name),
        party_contact_html(&invoice.supplier)
    ));
    html.push_str("</section>\n");

    html.push_str("<table class=\"lines\">\n<thead>\n<tr>");
    html.push_str("<th>SKU</th><th>Description</th><th class=\"num\">Qty</th>");
    html.push_str(&format!(
        "<th class=\"num\">Unit cost ({})</th><th class=\"num\">Amount ({})</th>",
        escape_html(&invoice.currency),
        escape_html(&invoice.currency)
    ));
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for line in &invoice.lines {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>\n",
            escape_html(&line.sku),
            escape_html(&line.description),
            line.quantity,
            format_amount(line.unit_cost),
            format_amount(line.line_total),
        ));
    }
    html.push_str("</tbody>\n</table>\n");

    html.push_str("<table class=\"totals\">\n");
    html.push_str(&format!(
        "<tr><th>Subtotal</th><td>{}</td></tr>\n",
        format_amount(invoice.subtotal)
    ));
    html.push_str(&format!(
        "<tr><th>Tax ({})</th><td>{}</td></tr>\n",
        format_percent(invoice.tax_rate),
        format_amount(invoice.tax_amount)
    ));
    html.push_str(&format!(
        "<tr class=\"grand\"><th>Total</th><td>{} {}</td></tr>\n",
        format_amount(invoice.total_amount),
        escape_html(&invoice.currency)
    ));
    html.push_str("</table>\n");

    if let Some(notes) = &invoice.notes {
        html.push_str("<div class=\"notes\">\n<h3>Notes</h3>\n");
        html.push_str(&format!("<p>{}</p>\n", escape_html(notes).replace('\n', "<br>")));
        html.push_str("</div>\n");
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn party_contact_html(party: &InvoiceParty) -> String {
    let mut parts = Vec::new();
    if let Some(address) = party.address.as_deref().filter(|s| !s.is_empty()) {
        parts.push(escape_html(address).replace('\n', "<br>"));
    }
    if let Some(phone) = party.phone.as_deref().filter(|s| !s.is_empty()) {
        parts.push(escape_html(phone));
    }
    if let Some(email) = party.email.as_deref().filter(|s| !s.is_empty()) {
        parts.push(escape_html(email));
    }
    parts.join("<br>")
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::InvoiceLine;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_invoice() -> InvoiceData {
        InvoiceData {
            invoice_number: "INV-2026-000007".to_string(),
            invoice_date: Utc::now(),
            order_number: "PO-2026-000012".to_string(),
            order_date: Utc::now(),
            company: InvoiceParty {
                name: "Stockroom".to_string(),
                address: Some("1 Depot Way\nSpringfield".to_string()),
                phone: Some("555-0100".to_string()),
                email: Some("orders@stockroom.test".to_string()),
            },
            supplier: InvoiceParty {
                name: "Acme <Tools> & Co.".to_string(),
                address: Some("9 Forge St".to_string()),
                phone: None,
                email: None,
            },
            currency: "USD".to_string(),
            lines: vec![
                InvoiceLine {
                    sku: "WID-1".to_string(),
                    description: "Widget".to_string(),
                    quantity: 3,
                    unit_cost: dec!(4.99),
                    line_total: dec!(14.97),
                },
                InvoiceLine {
                    sku: "BOLT-8".to_string(),
                    description: "M8 bolt, box of 100".to_string(),
                    quantity: 2,
                    unit_cost: dec!(10.00),
                    line_total: dec!(20.00),
                },
            ],
            subtotal: dec!(34.97),
            tax_rate: dec!(0.08),
            tax_amount: dec!(2.80),
            total_amount: dec!(37.77),
            notes: None,
        }
    }

    #[test]
    fn renders_header_lines_and_totals() {
        let html = render_invoice_html(&sample_invoice());
        assert!(html.contains("INV-2026-000007"));
        assert!(html.contains("PO-2026-000012"));
        assert!(html.contains("WID-1"));
        assert!(html.contains("M8 bolt, box of 100"));
        assert!(html.contains("Tax (8%)"));
        assert!(html.contains("37.77 USD"));
    }

    #[test]
    fn escapes_supplier_markup() {
        let html = render_invoice_html(&sample_invoice());
        assert!(html.contains("Acme &lt;Tools&gt; &amp; Co."));
        assert!(!html.contains("Acme <Tools>"));
    }

    #[test]
    fn notes_section_only_renders_when_present() {
        let mut invoice = sample_invoice();
        assert!(!render_invoice_html(&invoice).contains("class=\"notes\""));

        invoice.notes = Some("Deliver to dock 4".to_string());
        let html = render_invoice_html(&invoice);
        assert!(html.contains("class=\"notes\""));
        assert!(html.contains("Deliver to dock 4"));
    }
}
