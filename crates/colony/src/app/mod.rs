pub(crate) mod bootstrap;
mod hive;
pub(crate) mod loop_runner;
mod sim;
