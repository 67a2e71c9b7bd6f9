pub mod chunk_manager;
pub mod heartbeat;
pub mod master;
pub mod namespace_manager;
pub mod operation_log;
pub mod service;

pub use master::Master;
