pub mod bindings;
pub mod coerce;
pub mod config;
pub mod control;
pub mod output;
pub mod registry;
pub mod runner;
pub mod step;
pub mod used_fields;
