//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

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
    /// ULIDs are lexicographically sortable and monotonically increasing
    /// within the same millisecond, which keeps message pagination cheap.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a random correlation ID for optimistic client mutations.
    #[must_use]
    pub fn generate_correlation(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Generate a cryptographically random token.
    #[must_use]
    pub fn generate_token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
