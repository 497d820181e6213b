pub mod document_counter;
pub mod inventory_order;
pub mod inventory_order_item;
pub mod product;
pub mod supplier;
pub mod supplier_return;
pub mod supplier_return_item;
pub mod user;
