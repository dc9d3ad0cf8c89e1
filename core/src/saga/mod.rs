pub mod definition;
pub mod execution;
pub mod hooks;

pub use definition::Saga;
