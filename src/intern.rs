//! Shared pool for strings that repeat across many records: file names,
//! MIME types and filesystem ids.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

static POOL: Lazy<Mutex<HashSet<Arc<str>>>> = Lazy::new(|| Mutex::new(HashSet::new()));

pub fn intern(value: &str) -> Arc<str> {
    let mut pool = match POOL.lock() {
        Ok(pool) => pool,
        Err(e) => e.into_inner(),
    };
    if let Some(existing) = pool.get(value) {
        return existing.clone();
    }
    let shared: Arc<str> = Arc::from(value);
    pool.insert(shared.clone());
    shared
}

/// Drops pooled strings nobody else references.
pub fn collect_garbage() -> usize {
    let mut pool = match POOL.lock() {
        Ok(pool) => pool,
        Err(e) => e.into_inner(),
    };
    let before = pool.len();
    pool.retain(|s| Arc::strong_count(s) > 1);
    before - pool.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_allocation() {
        let a = intern("text/plain");
        let b = intern("text/plain");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
