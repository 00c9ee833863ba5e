//! In-memory mirror of device zone state.

mod store;

pub use store::{ZoneRecord, ZoneSnapshot, ZoneStore};
