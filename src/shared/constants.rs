/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

// =============================================================================
// SLUG CONSTANTS
// =============================================================================

/// Maximum length for generated slugs (matches the DB column width)
pub const MAX_SLUG_LENGTH: usize = 100;

/// How many times a derived slug is retried with a fresh suffix when a
/// concurrent insert claims the candidate first
pub const SLUG_RETRY_ATTEMPTS: u32 = 3;
