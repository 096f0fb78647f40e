pub mod cleaning;
pub mod combining;
pub mod reporting;
pub mod selection;
pub mod training;
