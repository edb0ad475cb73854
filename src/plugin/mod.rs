//! Ordered message-transform pipeline.
//!
//! Transforms are pre-resolved by name (discovery and dynamic loading are
//! someone else's problem) and applied in order before a message is
//! produced. One failing transform is logged and skipped; the send is
//! aborted only when every transform failed and nothing sendable
//! remains.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::core::error::{Error, Result};

/// Arguments supplied for transform parameters, keyed by parameter name.
pub type TransformArgs = HashMap<String, String>;

/// A named, single-message transform.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    /// Ordered parameter names this transform expects in its args.
    fn parameters(&self) -> &[&str] {
        &[]
    }

    fn apply(&self, message: &str, args: &TransformArgs) -> anyhow::Result<String>;
}

/// A transform that emits zero or more messages instead of rewriting one
/// (the "batch" plugin shape).
pub trait BatchTransform: Send + Sync {
    fn name(&self) -> &str;

    fn parameters(&self) -> &[&str] {
        &[]
    }

    fn run(
        &self,
        message: &str,
        args: &TransformArgs,
        send: &mut dyn FnMut(String) -> anyhow::Result<()>,
    ) -> anyhow::Result<()>;
}

/// An ordered set of enabled transforms.
pub struct Pipeline {
    transforms: Vec<Arc<dyn Transform>>,
}

impl Pipeline {
    pub fn new(transforms: Vec<Arc<dyn Transform>>) -> Self {
        Self { transforms }
    }

    /// Resolves enabled transform names against a registry, preserving
    /// order. Unknown names are a typed error, not a skip.
    pub fn resolve(names: &[String], registry: &[Arc<dyn Transform>]) -> Result<Self> {
        let mut transforms = Vec::with_capacity(names.len());
        for name in names {
            let transform = registry
                .iter()
                .find(|t| t.name() == name)
                .cloned()
                .ok_or_else(|| Error::UnknownTransform { name: name.clone() })?;
            transforms.push(transform);
        }
        Ok(Self { transforms })
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Applies every transform in order. A transform failure leaves the
    /// message as the previous stage produced it and the pipeline keeps
    /// going; only a pipeline in which *all* transforms failed aborts.
    pub fn apply_all(&self, message: &str, args: &TransformArgs) -> Result<String> {
        if self.transforms.is_empty() {
            return Ok(message.to_string());
        }

        let mut current = message.to_string();
        let mut succeeded = 0usize;
        let mut last_error = String::new();
        for transform in &self.transforms {
            match transform.apply(&current, args) {
                Ok(next) => {
                    current = next;
                    succeeded += 1;
                }
                Err(err) => {
                    warn!(
                        target: "mqprobe::plugin",
                        transform = %transform.name(),
                        error = %err,
                        "transform failed; continuing with remaining transforms"
                    );
                    last_error = err.to_string();
                }
            }
        }

        if succeeded == 0 {
            return Err(Error::TransformFailed { reason: last_error });
        }
        Ok(current)
    }
}
