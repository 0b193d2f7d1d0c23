//! Receipt Store (C6): the durable, local, single-process log of trade
//! facts and events backed by `sled`.

pub mod merge;
pub mod receipt;
pub mod store;

pub use receipt::{Event, Receipt};
pub use store::{ReceiptStore, StoreError, SCHEMA_VERSION};
