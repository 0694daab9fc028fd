//! Background collection scheduling

mod collector;

pub use collector::DataScheduler;
