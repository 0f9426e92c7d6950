pub mod address;
pub mod alloc_tracker;
pub mod constants;
pub mod logger;
pub mod options;
pub mod stats;

pub use address::{Address, ObjectReference};
