//! PDF rendering of an invoice via `lopdf` content streams.
//!
//! Pages are A4 (595x842 pt) with the built-in Helvetica fonts, so the
//! document needs no embedded font program. Long orders flow onto
//! continuation pages that repeat the table header.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use super::{format_amount, format_date, format_percent, InvoiceData, InvoiceParty};
use crate::errors::ServiceError;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const ROW_HEIGHT: f32 = 14.0;

const BODY_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";

const COL_SKU: f32 = MARGIN;
const COL_DESCRIPTION: f32 = 135.0;
const COL_QUANTITY: f32 = 355.0;
const COL_UNIT_COST: f32 = 415.0;
const COL_AMOUNT: f32 = 490.0;

/// Renders the invoice as a PDF byte stream.
pub fn render_invoice_pdf(invoice: &InvoiceData) -> Result<Vec<u8>, ServiceError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let body_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            BODY_FONT => body_font_id,
            BOLD_FONT => bold_font_id,
        },
    });

    let mut finished: Vec<PageWriter> = Vec::new();
    let mut current = PageWriter::new();
    write_letterhead(&mut current, invoice);
    write_table_header(&mut current);

    for line in &invoice.lines {
        if current.y < MARGIN + 2.0 * ROW_HEIGHT {
            let mut next = PageWriter::new();
            write_table_header(&mut next);
            finished.push(std::mem::replace(&mut current, next));
        }
        current.text_at(COL_SKU, current.y, BODY_FONT, 9.0, &line.sku);
        current.text_at(COL_DESCRIPTION, current.y, BODY_FONT, 9.0, &line.description);
        current.text_at(
            COL_QUANTITY,
            current.y,
            BODY_FONT,
            9.0,
            &line.quantity.to_string(),
        );
        current.text_at(
            COL_UNIT_COST,
            current.y,
            BODY_FONT,
            9.0,
            &format_amount(line.unit_cost),
        );
        current.text_at(
            COL_AMOUNT,
            current.y,
            BODY_FONT,
            9.0,
            &format_amount(line.line_total),
        );
        current.advance(ROW_HEIGHT);
    }

    let notes_rows = invoice
        .notes
        .as_deref()
        .map(|notes| wrapped_note_lines(notes).len() as f32 + 2.0)
        .unwrap_or(0.0);
    if current.y < MARGIN + (5.0 + notes_rows) * ROW_HEIGHT {
        finished.push(std::mem::replace(&mut current, PageWriter::new()));
    }
    write_totals(&mut current, invoice);
    if let Some(notes) = invoice.notes.as_deref() {
        write_notes(&mut current, notes);
    }
    finished.push(current);

    let mut kids: Vec<Object> = Vec::with_capacity(finished.len());
    for writer in finished {
        let content = Content {
            operations: writer.operations,
        };
        let encoded = content.encode().map_err(|e| {
            ServiceError::DocumentError(format!("Failed to encode invoice content stream: {}", e))
        })?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (PAGE_WIDTH as i64).into(),
                (PAGE_HEIGHT as i64).into(),
            ],
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| {
        ServiceError::DocumentError(format!("Failed to serialize invoice PDF: {}", e))
    })?;
    Ok(buffer)
}

/// Accumulates content-stream operations for one page, tracking a
/// top-down cursor.
struct PageWriter {
    operations: Vec<Operation>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn text_at(&mut self, x: f32, y: f32, font: &str, size: f32, text: &str) {
        self.operations.push(Operation::new("BT", vec![]));
        self.operations
            .push(Operation::new("Tf", vec![font.into(), size.into()]));
        self.operations
            .push(Operation::new("Td", vec![x.into(), y.into()]));
        self.operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(printable(text))],
        ));
        self.operations.push(Operation::new("ET", vec![]));
    }

    fn rule(&mut self, x1: f32, x2: f32) {
        self.operations.push(Operation::new("w", vec![0.7f32.into()]));
        self.operations
            .push(Operation::new("m", vec![x1.into(), self.y.into()]));
        self.operations
            .push(Operation::new("l", vec![x2.into(), self.y.into()]));
        self.operations.push(Operation::new("S", vec![]));
    }

    fn advance(&mut self, dy: f32) {
        self.y -= dy;
    }
}

fn write_letterhead(page: &mut PageWriter, invoice: &InvoiceData) {
    page.text_at(MARGIN, page.y, BOLD_FONT, 16.0, &invoice.company.name);
    page.text_at(PAGE_WIDTH - 160.0, page.y, BOLD_FONT, 18.0, "INVOICE");
    page.advance(ROW_HEIGHT + 4.0);

    for line in party_lines(&invoice.company) {
        page.text_at(MARGIN, page.y, BODY_FONT, 9.0, &line);
        page.advance(ROW_HEIGHT - 3.0);
    }

    let meta_x = PAGE_WIDTH - 230.0;
    let mut meta_y = PAGE_HEIGHT - MARGIN - ROW_HEIGHT - 4.0;
    for (label, value) in [
        ("Invoice #", invoice.invoice_number.clone()),
        ("Invoice date", format_date(invoice.invoice_date)),
        ("Order #", invoice.order_number.clone()),
        ("Order date", format_date(invoice.order_date)),
    ] {
        page.text_at(meta_x, meta_y, BODY_FONT, 9.0, label);
        page.text_at(meta_x + 70.0, meta_y, BODY_FONT, 9.0, &value);
        meta_y -= ROW_HEIGHT - 3.0;
    }
    if page.y > meta_y {
        page.y = meta_y;
    }
    page.advance(ROW_HEIGHT);

    page.text_at(MARGIN, page.y, BOLD_FONT, 10.0, "SUPPLIER");
    page.advance(ROW_HEIGHT - 2.0);
    page.text_at(MARGIN, page.y, BODY_FONT, 10.0, &invoice.supplier.name);
    page.advance(ROW_HEIGHT - 3.0);
    for line in party_lines(&invoice.supplier) {
        page.text_at(MARGIN, page.y, BODY_FONT, 9.0, &line);
        page.advance(ROW_HEIGHT - 3.0);
    }
    page.advance(ROW_HEIGHT);
}

fn write_table_header(page: &mut PageWriter) {
    page.text_at(COL_SKU, page.y, BOLD_FONT, 9.0, "SKU");
    page.text_at(COL_DESCRIPTION, page.y, BOLD_FONT, 9.0, "Description");
    page.text_at(COL_QUANTITY, page.y, BOLD_FONT, 9.0, "Qty");
    page.text_at(COL_UNIT_COST, page.y, BOLD_FONT, 9.0, "Unit cost");
    page.text_at(COL_AMOUNT, page.y, BOLD_FONT, 9.0, "Amount");
    page.advance(5.0);
    page.rule(MARGIN, PAGE_WIDTH - MARGIN);
    page.advance(ROW_HEIGHT - 2.0);
}

fn write_totals(page: &mut PageWriter, invoice: &InvoiceData) {
    page.advance(4.0);
    page.rule(COL_QUANTITY, PAGE_WIDTH - MARGIN);
    page.advance(ROW_HEIGHT);

    let label_x = COL_UNIT_COST - 45.0;
    page.text_at(label_x, page.y, BODY_FONT, 10.0, "Subtotal");
    page.text_at(
        COL_AMOUNT,
        page.y,
        BODY_FONT,
        10.0,
        &format_amount(invoice.subtotal),
    );
    page.advance(ROW_HEIGHT);

    let tax_label = format!("Tax ({})", format_percent(invoice.tax_rate));
    page.text_at(label_x, page.y, BODY_FONT, 10.0, &tax_label);
    page.text_at(
        COL_AMOUNT,
        page.y,
        BODY_FONT,
        10.0,
        &format_amount(invoice.tax_amount),
    );
    page.advance(ROW_HEIGHT);

    let total = format!(
        "{} {}",
        format_amount(invoice.total_amount),
        invoice.currency
    );
    page.text_at(label_x, page.y, BOLD_FONT, 11.0, "Total");
    page.text_at(COL_AMOUNT, page.y, BOLD_FONT, 11.0, &total);
    page.advance(ROW_HEIGHT);
}

fn write_notes(page: &mut PageWriter, notes: &str) {
    page.advance(ROW_HEIGHT);
    page.text_at(MARGIN, page.y, BOLD_FONT, 10.0, "Notes");
    page.advance(ROW_HEIGHT - 2.0);
    for line in wrapped_note_lines(notes) {
        page.text_at(MARGIN, page.y, BODY_FONT, 9.0, &line);
        page.advance(ROW_HEIGHT - 3.0);
    }
}

fn party_lines(party: &InvoiceParty) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(address) = party.address.as_deref().filter(|s| !s.is_empty()) {
        lines.extend(address.lines().map(str::to_string));
    }
    if let Some(phone) = party.phone.as_deref().filter(|s| !s.is_empty()) {
        lines.push(phone.to_string());
    }
    if let Some(email) = party.email.as_deref().filter(|s| !s.is_empty()) {
        lines.push(email.to_string());
    }
    lines
}

fn wrapped_note_lines(notes: &str) -> Vec<String> {
    notes
        .lines()
        .flat_map(|line| wrap_line(line, 95))
        .collect()
}

/// Splits a line on whitespace so no output line exceeds `max` characters.
/// A single word longer than `max` is kept whole rather than broken.
fn wrap_line(line: &str, max: usize) -> Vec<String> {
    let mut wrapped = Vec::new();
    let mut buffer = String::new();
    for word in line.split_whitespace() {
        if buffer.is_empty() {
            buffer.push_str(word);
        } else if buffer.len() + 1 + word.len() <= max {
            buffer.push(' ');
            buffer.push_str(word);
        } else {
            wrapped.push(std::mem::take(&mut buffer));
            buffer.push_str(word);
        }
    }
    if !buffer.is_empty() {
        wrapped.push(buffer);
    }
    if wrapped.is_empty() {
        wrapped.push(String::new());
    }
    wrapped
}

/// The built-in fonts carry no Unicode mapping, so anything outside
/// printable ASCII is substituted.
fn printable(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() {
                c
            } else {
                '?'
            }
        })
        .collect()
}
