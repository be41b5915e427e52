use crate::error::ExecutorError;
use crate::utils::{core_available, load_cfg};
use serde::{Deserialize, Serialize};

pub const DEFAULT_THREAD_NAME: &str = "cmdrt-worker";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Name given to the worker thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Pin the worker to this CPU core.
    #[serde(default)]
    pub core_id: Option<usize>,
    /// Minimum spacing between two failures logged at error level. Failures in
    /// between go to debug and are counted; the count is reported with the next
    /// error line or when the worker exits. Zero logs every failure as an error.
    #[serde(default = "default_failure_log_interval_ms")]
    pub failure_log_interval_ms: u64,
}

fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

fn default_failure_log_interval_ms() -> u64 {
    0
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            core_id: None,
            failure_log_interval_ms: default_failure_log_interval_ms(),
        }
    }
}

impl ExecutorConfig {
    /// Load from a config file; the format follows the file extension.
    pub fn from_file(path: impl AsRef<str>) -> anyhow::Result<Self> {
        load_cfg(path)
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.thread_name.trim().is_empty() {
            return Err(ExecutorError::InvalidConfig(
                "thread_name must not be empty".into(),
            ));
        }
        if self.thread_name.contains('\0') {
            return Err(ExecutorError::InvalidConfig(
                "thread_name must not contain NUL bytes".into(),
            ));
        }
        if let Some(core_id) = self.core_id
            && !core_available(core_id)
        {
            return Err(ExecutorError::InvalidConfig(format!(
                "core {core_id} is not available"
            )));
        }
        Ok(())
    }
}
