//! Engine configuration with documented defaults.
//!
//! All tunables live in one explicit struct threaded through
//! [`TurnRunner`](crate::engine::TurnRunner), so behavior is reproducible and
//! testable without process-wide state.

use std::time::Duration;

/// Configuration surface for the conversation engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum tool-invocation rounds per user turn before the engine
    /// forces a final answer.
    pub max_iterations: u32,
    /// Number of recent non-system messages kept in the window sent to the
    /// model. System messages are always retained.
    pub window_size: usize,
    /// System prompt injected at the head of the window when the history
    /// carries no system message of its own.
    pub system_prompt: Option<String>,
    /// Query-rewrite trigger thresholds.
    pub rewrite: RewriteConfig,
    /// Upper bound applied to each model and tool call. `None` blocks
    /// until the call returns.
    pub call_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Default tool-round bound per turn.
    pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
    /// Default context window, in non-system messages.
    pub const DEFAULT_WINDOW_SIZE: usize = 10;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_rewrite(mut self, rewrite: RewriteConfig) -> Self {
        self.rewrite = rewrite;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            system_prompt: None,
            rewrite: RewriteConfig::default(),
            call_timeout: None,
        }
    }
}

/// Thresholds controlling when the query rewriter fires.
///
/// A query needs rewriting when it is shorter than `min_chars`, or when it
/// contains one of `anaphora_markers` as a standalone word and the thread
/// has prior turns the reference could point back to.
#[derive(Clone, Debug)]
pub struct RewriteConfig {
    /// Set to false to skip the rewrite node entirely.
    pub enabled: bool,
    /// Queries below this length are considered underspecified.
    pub min_chars: usize,
    /// Lowercase marker words signaling a back-reference to earlier turns.
    pub anaphora_markers: Vec<String>,
}

impl RewriteConfig {
    /// Default short-query threshold, in characters.
    pub const DEFAULT_MIN_CHARS: usize = 12;

    fn default_markers() -> Vec<String> {
        [
            "it", "that", "this", "those", "these", "they", "them", "he", "she", "him", "her",
            "there", "above", "earlier", "before", "previous",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: Self::DEFAULT_MIN_CHARS,
            anaphora_markers: Self::default_markers(),
        }
    }
}
