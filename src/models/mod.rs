pub mod status;

pub use status::{OrderStatus, ReturnItemStatus, ReturnStatus};
