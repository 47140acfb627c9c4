//! Job, draft-version and change-log models shared by the store and pipeline.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pass::{MAX_PASSES, MIN_PASSES, PassKey};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Paused,
    Error,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// No command other than a repeated cancel or a read applies to a
    /// terminal job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "error" => Ok(Self::Error),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of every pass slot of one job, keyed by the closed `PassKey` set.
///
/// Always holds exactly `pass_1 ..= pass_{total}`; `from_map` rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassesStatus(BTreeMap<PassKey, PassStatus>);

impl PassesStatus {
    /// All passes pending. Fails when `total` is outside the 8–10 range.
    pub fn new(total: u32) -> Result<Self, String> {
        if !(MIN_PASSES..=MAX_PASSES).contains(&total) {
            return Err(format!(
                "total_passes must be between {} and {}, got {}",
                MIN_PASSES, MAX_PASSES, total
            ));
        }
        Ok(Self(
            PassKey::ALL[..total as usize]
                .iter()
                .map(|k| (*k, PassStatus::Pending))
                .collect(),
        ))
    }

    /// Validate a deserialized map against the job's pass count.
    pub fn from_map(map: BTreeMap<PassKey, PassStatus>, total: u32) -> Result<Self, String> {
        let expected = Self::new(total)?;
        if map.len() != expected.0.len() || !expected.0.keys().all(|k| map.contains_key(k)) {
            let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            return Err(format!(
                "passes_status must contain exactly pass_1..pass_{}, found [{}]",
                total,
                keys.join(", ")
            ));
        }
        Ok(Self(map))
    }

    pub fn total(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn get(&self, number: u32) -> Option<PassStatus> {
        PassKey::from_number(number).and_then(|k| self.0.get(&k).copied())
    }

    /// Set the status of an existing slot; out-of-range numbers are ignored.
    pub fn set(&mut self, number: u32, status: PassStatus) {
        if let Some(key) = PassKey::from_number(number)
            && let Some(slot) = self.0.get_mut(&key)
        {
            *slot = status;
        }
    }

    /// Reset every pass numbered `from` or higher to pending.
    pub fn reset_from(&mut self, from: u32) {
        for (key, status) in self.0.iter_mut() {
            if key.number() >= from {
                *status = PassStatus::Pending;
            }
        }
    }

    pub fn completed_count(&self) -> u32 {
        self.0
            .values()
            .filter(|s| **s == PassStatus::Completed)
            .count() as u32
    }

    /// Whether every pass numbered below `number` is completed.
    pub fn all_completed_below(&self, number: u32) -> bool {
        self.0
            .iter()
            .filter(|(k, _)| k.number() < number)
            .all(|(_, s)| *s == PassStatus::Completed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PassKey, PassStatus)> + '_ {
        self.0.iter().map(|(k, s)| (*k, *s))
    }
}

/// Request recorded against a running job and honored at the next pass boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlRequest {
    Pause,
}

impl ControlRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
        }
    }
}

impl FromStr for ControlRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(Self::Pause),
            _ => Err(format!("Invalid control request: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub topic_id: String,
    pub brief_id: String,
    pub total_passes: u32,
    pub current_pass: u32,
    pub status: JobStatus,
    pub passes_status: PassesStatus,
    pub draft: String,
    pub last_error: Option<String>,
    pub final_audit_score: Option<f64>,
    /// Pending pause request; not covered by `version_tag`.
    pub control: Option<ControlRequest>,
    /// Optimistic concurrency token, incremented by every tag-checked write.
    pub version_tag: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// Whether all passes have run (`current_pass` is past the last one).
    pub fn all_passes_done(&self) -> bool {
        self.current_pass > self.total_passes
    }
}

/// Upstream context handed to every pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobContext {
    pub brief: String,
    #[serde(default)]
    pub business_info: serde_json::Value,
}

impl JobContext {
    /// Check that the context a pass needs is present.
    pub fn validate(&self) -> Result<(), String> {
        if self.brief.trim().is_empty() {
            return Err("content brief is missing".to_string());
        }
        if !self.business_info.is_object() {
            return Err("business info must be a JSON object".to_string());
        }
        Ok(())
    }
}

/// Input for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub topic_id: String,
    pub brief_id: String,
    pub total_passes: u32,
    pub context: JobContext,
    /// Starting draft; usually empty so the first pass writes it.
    pub initial_draft: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftVersion {
    pub version: u32,
    pub content: String,
    pub char_count: u32,
    pub saved_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    ImageAdded,
    ImageModified,
    Other,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageAdded => "image_added",
            Self::ImageModified => "image_modified",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image_added" => Ok(Self::ImageAdded),
            "image_modified" => Ok(Self::ImageModified),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid change type: {}", s)),
        }
    }
}

/// A change reported by a pass, before it is stamped with an id and pass number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChangeLogEntry {
    pub section_key: String,
    #[serde(default = "default_change_type")]
    pub change_type: ChangeType,
    #[serde(default)]
    pub criteria_met: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

fn default_change_type() -> ChangeType {
    ChangeType::Other
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    pub id: String,
    pub section_key: String,
    pub pass: u32,
    pub change_type: ChangeType,
    /// Sorted and deduplicated.
    pub criteria_met: Vec<String>,
    pub reason: String,
    pub created_at: String,
}

/// Character count as stored on a version row.
pub fn char_count(content: &str) -> u32 {
    content.chars().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Paused,
            JobStatus::Error,
            JobStatus::Completed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_only_cancelled_is_terminal() {
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Error.is_terminal());
    }

    #[test]
    fn test_passes_status_new_bounds() {
        assert!(PassesStatus::new(7).is_err());
        assert!(PassesStatus::new(11).is_err());
        let status = PassesStatus::new(8).unwrap();
        assert_eq!(status.total(), 8);
        assert_eq!(status.get(8), Some(PassStatus::Pending));
        assert_eq!(status.get(9), None);
    }

    #[test]
    fn test_passes_status_from_map_rejects_missing_keys() {
        let mut map = BTreeMap::new();
        for key in &PassKey::ALL[..7] {
            map.insert(*key, PassStatus::Completed);
        }
        assert!(PassesStatus::from_map(map.clone(), 8).is_err());
        map.insert(PassKey::Pass8, PassStatus::Pending);
        let status = PassesStatus::from_map(map, 8).unwrap();
        assert_eq!(status.completed_count(), 7);
    }

    #[test]
    fn test_passes_status_from_map_rejects_extra_keys() {
        let mut map = BTreeMap::new();
        for key in PassKey::ALL {
            map.insert(key, PassStatus::Pending);
        }
        assert!(PassesStatus::from_map(map, 9).is_err());
    }

    #[test]
    fn test_reset_from_leaves_lower_passes() {
        let mut status = PassesStatus::new(10).unwrap();
        for n in 1..=10 {
            status.set(n, PassStatus::Completed);
        }
        status.reset_from(5);
        assert!(status.all_completed_below(5));
        assert_eq!(status.get(4), Some(PassStatus::Completed));
        assert_eq!(status.get(5), Some(PassStatus::Pending));
        assert_eq!(status.get(10), Some(PassStatus::Pending));
        assert_eq!(status.completed_count(), 4);
    }

    #[test]
    fn test_set_ignores_out_of_range() {
        let mut status = PassesStatus::new(8).unwrap();
        status.set(9, PassStatus::Completed);
        status.set(0, PassStatus::Completed);
        assert_eq!(status.completed_count(), 0);
    }

    #[test]
    fn test_passes_status_serializes_as_map() {
        let mut status = PassesStatus::new(8).unwrap();
        status.set(1, PassStatus::Completed);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["pass_1"], "completed");
        assert_eq!(json["pass_8"], "pending");
    }

    #[test]
    fn test_context_validation() {
        let ctx = JobContext {
            brief: "  ".into(),
            business_info: serde_json::json!({}),
        };
        assert!(ctx.validate().is_err());

        let ctx = JobContext {
            brief: "Write about VvE management".into(),
            business_info: serde_json::Value::Null,
        };
        assert!(ctx.validate().is_err());

        let ctx = JobContext {
            brief: "Write about VvE management".into(),
            business_info: serde_json::json!({"name": "Acme"}),
        };
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_new_change_log_entry_defaults() {
        let entry: NewChangeLogEntry =
            serde_json::from_str(r#"{"section_key":"intro"}"#).unwrap();
        assert_eq!(entry.change_type, ChangeType::Other);
        assert!(entry.criteria_met.is_empty());
    }

    #[test]
    fn test_char_count_counts_scalars() {
        assert_eq!(char_count("héllo"), 5);
        assert_eq!(char_count(""), 0);
    }
}
