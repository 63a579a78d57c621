//! Test suites for the render daemon.

mod behaviour;
mod support;
