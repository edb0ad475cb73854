//! Built-in transforms for common JSON test messages.
//!
//! Each rewrites one well-known field and leaves messages without that
//! field untouched; a non-JSON message is a transform error (and gets
//! skipped by the pipeline).

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::{BatchTransform, Transform, TransformArgs};

fn parse_object(message: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(message)?;
    anyhow::ensure!(value.is_object(), "message is not a JSON object");
    Ok(value)
}

/// Regenerates the `uuid` field with a fresh v4 UUID.
pub struct UuidTransform;

impl Transform for UuidTransform {
    fn name(&self) -> &str {
        "uuid"
    }

    fn apply(&self, message: &str, _args: &TransformArgs) -> anyhow::Result<String> {
        let mut value = parse_object(message)?;
        if let Some(field) = value.get_mut("uuid") {
            *field = Value::String(Uuid::new_v4().to_string());
            return Ok(value.to_string());
        }
        Ok(message.to_string())
    }
}

/// Stamps the `create_time` field with the current UTC time.
pub struct CreateTimeTransform;

impl Transform for CreateTimeTransform {
    fn name(&self) -> &str {
        "create-time"
    }

    fn apply(&self, message: &str, _args: &TransformArgs) -> anyhow::Result<String> {
        let mut value = parse_object(message)?;
        if let Some(field) = value.get_mut("create_time") {
            *field = Value::String(Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string());
            return Ok(value.to_string());
        }
        Ok(message.to_string())
    }
}

/// Rewrites the `time_out` field with a given number of seconds,
/// stored as milliseconds.
pub struct TimeoutTransform;

impl Transform for TimeoutTransform {
    fn name(&self) -> &str {
        "timeout"
    }

    fn parameters(&self) -> &[&str] {
        &["seconds"]
    }

    fn apply(&self, message: &str, args: &TransformArgs) -> anyhow::Result<String> {
        let seconds: u64 = args
            .get("seconds")
            .ok_or_else(|| anyhow::anyhow!("missing \"seconds\" argument"))?
            .parse()?;
        let mut value = parse_object(message)?;
        if let Some(field) = value.get_mut("time_out") {
            *field = Value::from(seconds * 1000);
            return Ok(value.to_string());
        }
        Ok(message.to_string())
    }
}

/// Emits the message `count` times (batch shape).
pub struct SendMore;

impl BatchTransform for SendMore {
    fn name(&self) -> &str {
        "send-more"
    }

    fn parameters(&self) -> &[&str] {
        &["count"]
    }

    fn run(
        &self,
        message: &str,
        args: &TransformArgs,
        send: &mut dyn FnMut(String) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let count: u32 = args
            .get("count")
            .ok_or_else(|| anyhow::anyhow!("missing \"count\" argument"))?
            .parse()?;
        for _ in 0..count {
            send(message.to_string())?;
        }
        Ok(())
    }
}

/// All built-in single-message transforms, in registry order.
pub fn builtin_transforms() -> Vec<Arc<dyn Transform>> {
    vec![
        Arc::new(UuidTransform),
        Arc::new(CreateTimeTransform),
        Arc::new(TimeoutTransform),
    ]
}

/// All built-in batch transforms.
pub fn builtin_batch_transforms() -> Vec<Arc<dyn BatchTransform>> {
    vec![Arc::new(SendMore)]
}
