pub mod server;
pub mod service;
pub mod store;

pub use server::ChunkServer;
pub use store::ChunkStore;
