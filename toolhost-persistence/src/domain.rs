//! The fixed set of domains the persistence manager serves an adapter for.
//!
//! Concrete per-domain schemas are out of scope for this layer (the stored
//! form is an opaque JSON record keyed by an id string); this module only
//! fixes the vocabulary so adapters, capability maps and the filesystem
//! document use consistent names.

pub const JUDGMENTS: &str = "judgments";
pub const PATTERNS: &str = "patterns";
pub const FEEDBACK: &str = "feedback";
pub const KNOWLEDGE: &str = "knowledge";
pub const POJ_BLOCKS: &str = "pojBlocks";
pub const TRIGGERS: &str = "triggersState";
pub const SESSIONS: &str = "sessions";
pub const LIBRARY_CACHE: &str = "libraryCache";
pub const PSYCHOLOGY: &str = "psychology";
pub const FACTS: &str = "facts";
pub const AUTONOMY_GOALS: &str = "autonomyGoals";
pub const AUTONOMY_TASKS: &str = "autonomyTasks";
pub const AUTONOMY_NOTIFICATIONS: &str = "autonomyNotifications";

/// Every domain the filesystem fallback document must carry a top-level
/// array (or object, for `triggersState`/`psychology`) for.
pub const ALL: &[&str] = &[
    JUDGMENTS,
    PATTERNS,
    FEEDBACK,
    KNOWLEDGE,
    POJ_BLOCKS,
    TRIGGERS,
    SESSIONS,
    LIBRARY_CACHE,
    PSYCHOLOGY,
    FACTS,
    AUTONOMY_GOALS,
    AUTONOMY_TASKS,
    AUTONOMY_NOTIFICATIONS,
];
