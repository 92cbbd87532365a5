//! The four sink kinds named in §9's design note: dump, container-metric,
//! drain, and channel (firehose / test / external subscriber).

pub mod channel;
pub mod container_metric;
pub mod drain;
pub mod dump;
