//! Cache tiers and the consistency machinery built on them.
//!
//! Reads go through [`RecordCache`], which falls back to a [`Coalescer`] on
//! miss so that one store load per key is in flight at a time. Writes are
//! bracketed by an [`Invalidator`]. All deferred work (second deletes,
//! registry eviction) runs on a [`Scheduler`].

pub mod coalesce;
pub mod invalidate;
pub mod record;
pub mod redis;
pub mod scheduler;
pub mod tier;

pub use coalesce::Coalescer;
pub use invalidate::Invalidator;
pub use record::RecordCache;
pub use self::redis::RedisTier;
pub use scheduler::Scheduler;
pub use tier::{CacheTier, MemoryTier, TieredCache};
