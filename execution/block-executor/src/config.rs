// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use occ_types::Incarnation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config sanitizer failed for {0}: {1}")]
    ConfigSanitizerFailed(String, String),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockExecutorConfig {
    /// Maximum number of incarnations executing at the same time. 1 runs the block
    /// sequentially.
    pub concurrency_level: usize,
    /// Once a transaction reaches this incarnation, the rest of the block is executed
    /// sequentially.
    pub max_incarnation: Incarnation,
    /// Whether declared access dependencies gate dispatch.
    pub use_dependency_hints: bool,
    /// Validate incarnations on the executor thread pool instead of the calling thread.
    pub parallel_validation: bool,
}

impl Default for BlockExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency_level: num_cpus::get(),
            max_incarnation: 10,
            use_dependency_hints: true,
            parallel_validation: true,
        }
    }
}

impl BlockExecutorConfig {
    pub fn sequential() -> Self {
        Self {
            concurrency_level: 1,
            ..Default::default()
        }
    }

    pub fn sanitize(&self) -> Result<(), ConfigError> {
        let sanitizer_name = "BlockExecutorConfig".to_string();
        let num_cpus = num_cpus::get();
        if self.concurrency_level == 0 || self.concurrency_level > num_cpus {
            return Err(ConfigError::ConfigSanitizerFailed(
                sanitizer_name,
                format!(
                    "concurrency level {} should be between 1 and number of CPUs {}",
                    self.concurrency_level, num_cpus
                ),
            ));
        }
        if self.max_incarnation == 0 {
            return Err(ConfigError::ConfigSanitizerFailed(
                sanitizer_name,
                "max incarnation must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
