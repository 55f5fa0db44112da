//! Monotonic per-prefix id generation (`cart_1`, `order_2`, ...).

use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct IdGenerator {
    counters: Mutex<HashMap<String, u64>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for the prefix, formatted `"{prefix}_{n}"` starting at 1.
    pub fn next(&self, prefix: &str) -> String {
        let mut counters = self.counters.lock();
        let counter = counters.entry(prefix.to_owned()).or_insert(0);
        *counter += 1;
        format!("{prefix}_{counter}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_per_prefix() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next("cart"), "cart_1");
        assert_eq!(ids.next("cart"), "cart_2");
        assert_eq!(ids.next("order"), "order_1");
        assert_eq!(ids.next("cart"), "cart_3");
    }
}
