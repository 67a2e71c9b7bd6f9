pub mod client;

pub use client::GfsClient;
