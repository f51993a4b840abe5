pub mod app;
pub mod cli;
pub mod config;
pub mod detector;
pub mod discovery;
pub mod output;
pub mod request;
pub mod runner;

#[cfg(test)]
mod tests;
