pub mod connection;
pub mod schema;

pub use connection::{make_pool, make_pool_with_size};
pub use schema::{count_rows, current_database, discover_table_columns, verify_mapping};
