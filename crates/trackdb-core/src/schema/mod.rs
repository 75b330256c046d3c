//! Schema value model.
//!
//! `Schema`, `Table` and `Column` are frozen snapshots produced by the
//! inspector (or built by hand for the target schema). Every downstream
//! component works on these values, never on the live database.

mod column;
mod snapshot;
mod table;
mod types;

pub use column::Column;
pub use snapshot::Schema;
pub use table::Table;
pub use types::{ColumnType, DefaultValue};

/// Quote an SQL identifier with double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn normalize_table_key(name: &str) -> String {
    name.to_ascii_lowercase()
}
