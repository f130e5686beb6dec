pub mod client;
pub mod identifier;
