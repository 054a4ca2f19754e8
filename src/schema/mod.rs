//! Health record feed schema
//!
//! Defines the raw record shape shared by the JSON and Apple Health XML
//! encodings, and the adapter that turns a feed into typed [`Record`]s.
//!
//! [`Record`]: crate::types::Record

mod raw_record;
mod adapter;

pub use raw_record::*;
pub use adapter::*;
