use std::time::Duration;

/// Tunables for a [`Reconciler`](crate::Reconciler).
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    /// The work loop yields once the deadline reports less than this.
    pub yield_threshold: Duration,
    /// Property names starting with this prefix are event handlers.
    pub event_prefix: String,
    /// Treat a change in hook count between renders as a render error.
    pub strict_hooks: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            yield_threshold: Duration::from_millis(1),
            event_prefix: "on".to_owned(),
            strict_hooks: true,
        }
    }
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn yield_threshold(mut self, threshold: Duration) -> Self {
        self.yield_threshold = threshold;
        self
    }

    pub fn event_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_prefix = prefix.into();
        self
    }

    pub fn strict_hooks(mut self, strict: bool) -> Self {
        self.strict_hooks = strict;
        self
    }

    /// Splits `name` into the event it listens for, or `None` for a plain
    /// attribute. `"onClick"` becomes `"click"`.
    pub fn event_name(&self, name: &str) -> Option<String> {
        let prefix = self.event_prefix.as_str();
        if prefix.is_empty() || !name.starts_with(prefix) {
            return None;
        }
        Some(name[prefix.len()..].to_ascii_lowercase())
    }
}
