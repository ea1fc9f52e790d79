#![cfg(unix)]

pub(crate) mod common;

mod cancellation;
mod configuration;
mod list;
mod test_command;
