pub mod models;
pub mod warehouse;

pub use warehouse::Warehouse;
