//! Current date/time tool.

use async_trait::async_trait;
use chrono::Local;
use serde_json::Value;

use super::{Tool, ToolError};

/// Reports the current local date, time, and weekday.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "get_current_datetime"
    }

    fn description(&self) -> &str {
        "Get the current date and time, including the day of the week. \
         Use when the user asks about today's date, the current time, or the weekday."
    }

    async fn invoke(&self, _arguments: Value) -> Result<String, ToolError> {
        Ok(Local::now().format("%Y-%m-%d %H:%M:%S (%A)").to_string())
    }
}
