// Purchasing workflow services
pub mod purchase_orders;
pub mod returns;

// Master data services
pub mod products;
pub mod suppliers;

// Invoice document assembly
pub mod invoices;

// Document number sequences shared by the workflow services
pub mod sequences;
