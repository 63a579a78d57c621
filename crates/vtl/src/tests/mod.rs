//! Test suites for the template engine.

mod behaviour;
