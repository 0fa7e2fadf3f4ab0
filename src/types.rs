use std::str::FromStr;
use serde::Deserialize;

/// How the monitor treats a job that is `OnHold` or `Cancelling`.
///
/// - `Fail` (default): report the job as failed and dump its logs, the same
///   as `Error` / `Cancelled`.
/// - `KeepPolling`: keep polling; the job only counts as failed once it
///   reaches `Error` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HoldPolicy {
    #[default]
    Fail,
    KeepPolling,
}

impl FromStr for HoldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(HoldPolicy::Fail),
            "keep_polling" | "keep-polling" => Ok(HoldPolicy::KeepPolling),
            other => Err(format!(
                "invalid hold_policy: {other} (expected \"fail\" or \"keep_polling\")"
            )),
        }
    }
}
