pub mod cli;
pub mod config;
pub mod database;
pub mod deployer;
pub mod events;
pub mod global;
pub mod image_provider;
pub mod logging;
pub mod notifier;
pub mod signal;
pub mod uploader;
pub mod worker;

#[cfg(test)]
mod tests;
