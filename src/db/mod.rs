pub mod connection;
pub mod indexes;
pub mod queries;
pub mod repositories;
pub mod schema;
pub mod uploads;

pub use connection::Database;
