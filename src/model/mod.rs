pub mod ols;
pub mod seasonal;
pub mod store;

pub use seasonal::{SeasonalConfig, SeasonalModel};
pub use store::ModelStore;
