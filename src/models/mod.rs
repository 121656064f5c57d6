pub mod log_record;

pub use log_record::*;
