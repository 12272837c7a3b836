#![cfg_attr(feature = "strict", deny(warnings))]

mod telemetry;

pub use telemetry::{telemetry, ConsoleLogging};
