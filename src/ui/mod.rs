// UI module - console front end for vmxtune
//
// Contains:
// - console: Console trait and the stdin/stdout implementation
// - controller: RunController, the sequential per-file remediation loop

pub mod console;
pub mod controller;

pub use console::{Console, StdConsole, confirm};
pub use controller::{RunController, RunError, RunOptions};
