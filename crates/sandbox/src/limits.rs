use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds applied to a single evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Wall-clock budget for one evaluation.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Heap available to the engine.
    pub max_memory_bytes: usize,
    /// Native stack available to the engine.
    pub max_stack_bytes: usize,
    /// Maximum source length in bytes.
    pub max_source_bytes: usize,
    /// Maximum length in bytes of the serialized result.
    pub max_output_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_memory_bytes: 32 * 1024 * 1024,
            max_stack_bytes: 512 * 1024,
            max_source_bytes: 16 * 1024,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl SandboxLimits {
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn with_max_memory_bytes(mut self, max_memory_bytes: usize) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    #[inline]
    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
