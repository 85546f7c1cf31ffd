/// Field merged into written values and compared by the optimistic check.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Separator between channel segments.
pub const CHANNEL_SEPARATOR: char = '/';

/// Glob wildcard used when an id or band filter is absent.
pub const WILDCARD: &str = "*";

/// Characters percent-encoded inside an id or band segment.
pub const ESCAPED_CHARS: &[char] = &['/', '$', '%', '#', '.', ']', '['];

/// Logical databases a store exposes (`SELECT 0..=15`).
pub const MAX_DB_INDEX: i64 = 15;
