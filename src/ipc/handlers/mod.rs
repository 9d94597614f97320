pub mod core;
pub mod results;
