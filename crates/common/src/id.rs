//! ID generation utilities.

use std::sync::{LazyLock, Mutex, PoisonError};

use ulid::{Generator, Ulid};
use uuid::Uuid;

/// Shared so ids stay monotonic across every `IdGenerator` in the process.
static ULIDS: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// Ids are strictly increasing within the process, even inside one
    /// millisecond, so message ids break ties between equal timestamps.
    #[must_use]
    pub fn generate(&self) -> String {
        let ulid = ULIDS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()
            .unwrap_or_else(|_| Ulid::new());
        ulid.to_string().to_lowercase()
    }

    /// Generate an opaque access token.
    #[must_use]
    pub fn generate_token(&self) -> String {
        // No time component in tokens
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_eq!(id2.len(), 26);
        assert_ne!(id1, id2);
        assert_eq!(id1, id1.to_lowercase());
    }

    #[test]
    fn test_generate_is_monotonic() {
        let id_gen = IdGenerator::new();
        let other = IdGenerator::new();

        let ids: Vec<String> = (0..1000)
            .map(|i| if i % 2 == 0 { id_gen.generate() } else { other.generate() })
            .collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_generate_token() {
        let id_gen = IdGenerator::new();
        let token = id_gen.generate_token();

        assert_eq!(token.len(), 32);
        assert_ne!(token, id_gen.generate_token());
    }
}
