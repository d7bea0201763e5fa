//! Strata Events: the process-wide subscription table.
//!
//! Each subscriber owns a bounded channel (capacity 1 by default). Publishing
//! never waits: a full channel means the event is dropped for that
//! subscriber only. The topic table sits behind one short read/write lock;
//! publish takes the read side, subscribe and unsubscribe the write side.

mod manager;

pub use manager::{PublishReport, Subscription, SubscriptionId, SubscriptionManager};
