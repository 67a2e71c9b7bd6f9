pub mod oplog_codec;
pub mod rng;
pub mod rpc;
pub mod time;
pub mod ttl_cache;

pub use ttl_cache::TtlCache;
