//! Relational database adapters.

mod params;
mod postgres;
mod rds;

pub use params::translate_named_params;
pub use postgres::PostgresAdapter;
pub use rds::RdsAdapter;
