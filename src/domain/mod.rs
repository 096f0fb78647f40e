pub mod errors;
pub mod metrics;
pub mod split;
pub mod table;
