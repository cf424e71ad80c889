pub mod health;
pub mod postgres;

pub use health::HealthCheck;
pub use postgres::PostgresProvider;
