// SQLite persistence for the catalog and the interaction log

pub mod sqlite;

pub use sqlite::*;
