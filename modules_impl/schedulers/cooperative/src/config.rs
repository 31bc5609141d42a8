//! # Cooperative Scheduler Configuration

/// Configuration for the cooperative scheduler
#[derive(Debug, Clone)]
pub struct CoopConfig {
    /// Host stack size for each spawned context (in bytes)
    pub stack_size: usize,
    /// Prefix for host thread names; the context id is appended
    pub thread_name_prefix: String,
}

impl CoopConfig {
    /// Default stack: 2 MiB
    pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
    /// Compact stack: 256 KiB
    pub const COMPACT_STACK_SIZE: usize = 256 * 1024;
    /// Default thread name prefix
    pub const DEFAULT_PREFIX: &'static str = "cinder-ctx";

    /// Create default configuration
    pub fn new() -> Self {
        Self {
            stack_size: Self::DEFAULT_STACK_SIZE,
            thread_name_prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }

    /// Small stacks, for workloads that spawn many short contexts
    pub fn compact() -> Self {
        Self {
            stack_size: Self::COMPACT_STACK_SIZE,
            ..Self::new()
        }
    }

    /// Override the stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Override the thread name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub(crate) fn thread_name(&self, ctx: u64) -> String {
        format!("{}-{}", self.thread_name_prefix, ctx)
    }
}

impl Default for CoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(CoopConfig::new().stack_size, CoopConfig::DEFAULT_STACK_SIZE);
        assert_eq!(CoopConfig::compact().stack_size, CoopConfig::COMPACT_STACK_SIZE);
        assert_eq!(CoopConfig::compact().thread_name_prefix, CoopConfig::DEFAULT_PREFIX);
    }

    #[test]
    fn test_thread_name() {
        let config = CoopConfig::new().with_name_prefix("worker");
        assert_eq!(config.thread_name(7), "worker-7");
    }
}
