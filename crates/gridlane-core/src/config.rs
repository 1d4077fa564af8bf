//! Context configuration

use std::env;

use gridlane_backends::CpuConfig;

/// Backend a [`crate::Context`] dispatches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// CPU reference backend (always available)
    #[default]
    Cpu,
    /// Metal backend (Apple platforms only)
    Metal,
}

/// Settings used when building a [`crate::Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// `None` picks the best available backend at construction time.
    pub backend: Option<BackendType>,
    /// Execution limits for the CPU backend
    pub cpu: CpuConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            backend: Some(BackendType::Cpu),
            cpu: CpuConfig::default(),
        }
    }
}

impl ContextConfig {
    /// Build a configuration from environment hints.
    ///
    /// # Environment Variables
    ///
    /// - `GRIDLANE_BACKEND` - `cpu` (default), `metal` or `auto`
    /// - `GRIDLANE_CPU_LOCKSTEP_WIDTH` - lanes per lockstep unit on the CPU backend
    /// - `GRIDLANE_CPU_MAX_GROUP_THREADS` - threads per execution group on the CPU backend
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var("GRIDLANE_BACKEND") {
            match value.trim().to_ascii_lowercase().as_str() {
                "cpu" => config.backend = Some(BackendType::Cpu),
                "metal" => config.backend = Some(BackendType::Metal),
                "auto" => config.backend = None,
                _ => tracing::warn!(key = "GRIDLANE_BACKEND", %value, "ignoring unknown backend"),
            }
        }

        if let Some(width) = positive_u32("GRIDLANE_CPU_LOCKSTEP_WIDTH") {
            config.cpu.lockstep_width = width;
        }
        if let Some(threads) = positive_u32("GRIDLANE_CPU_MAX_GROUP_THREADS") {
            config.cpu.max_threads_per_group = threads;
        }

        config
    }
}

fn positive_u32(key: &str) -> Option<u32> {
    let value = env::var(key).ok()?;
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        _ => {
            tracing::warn!(key, %value, "ignoring invalid value");
            None
        }
    }
}
