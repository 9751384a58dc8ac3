//! String key-value storage used for the in-flight session snapshot.

mod memory;

use std::{future::Future, pin::Pin};

use anyhow::Result;

pub use memory::MemoryStore;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Object-safe async key-value store. Values are opaque strings (JSON in
/// practice).
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}
