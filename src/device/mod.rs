pub mod btle;
pub mod connection;
pub mod constants;
pub mod controller;
pub mod driver;
/// Test support: an in-memory `RadioDriver` that records requests. Used by the unit tests and
/// the integration tests under `tests/`, which can only reach public items.
pub mod fake;
pub mod gate;
pub mod registry;
pub mod scan;
pub mod types;
