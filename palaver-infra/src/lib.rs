//! Durable storage and concurrency primitives for the palaver runtime.

pub mod infra;
