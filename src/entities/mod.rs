pub mod idempotency_key;
pub mod lifecycle;
pub mod location;
pub mod product;
pub mod stock_entry;

pub use lifecycle::{Lifecycle, SoftDelete};

/// Key under which product and location names must be unique: trimmed and
/// Unicode-lowercased. Folding happens here rather than in SQL because
/// SQLite's `lower()` only folds ASCII.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_key_folds_beyond_ascii() {
        assert_eq!(name_key("  Ärmel "), "ärmel");
        assert_eq!(name_key("ÜBERSEELAGER"), name_key("Überseelager"));
    }
}
