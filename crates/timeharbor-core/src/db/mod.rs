//! Durable local store for Time Harbor

mod batch;
mod collection;
mod connection;
pub mod metadata;
mod migrations;
mod schema;
mod store;

pub use batch::Batch;
pub use collection::{Collection, Record};
pub use connection::Database;
pub use metadata::Metadata;
pub use schema::{CollectionName, Index, IndexValue};
pub use store::Store;
