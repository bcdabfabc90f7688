pub mod forecast;
pub mod health;
pub mod routes;
pub mod triggers;
