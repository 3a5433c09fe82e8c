pub mod command;
pub mod config;
pub mod connection;
pub mod generator;
pub mod http;
pub mod pool;
pub mod resp_value;

#[cfg(test)]
mod test_store;
