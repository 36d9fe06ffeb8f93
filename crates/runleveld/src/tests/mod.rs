//! Test suites for the runlevel supervisor.

mod control_commands;
mod support;
