pub mod engine;
pub mod error;
pub mod ports;
pub mod schema;
pub mod script;
pub mod value;
