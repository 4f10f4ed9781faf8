//! Narrative audit trail attached to long-running work.
//!
//! A job is append-only while open. [`Job::close`] seals it; later narration
//! fails. Jobs created by this service must carry a cause before they can be
//! attached to a response, while resumed jobs were already announced.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by job operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job has already been closed.
    #[error("job '{id}' is closed")]
    Closed {
        /// Job identifier.
        id: String,
    },
    /// A new job was attached without a cause.
    #[error("job '{id}' is new and requires a cause")]
    MissingCause {
        /// Job identifier.
        id: String,
    },
}

/// Attachment carried by a job entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "att_type", rename_all = "snake_case")]
pub enum Attachment {
    /// Hex rendering of binary data.
    HexDump {
        /// Caption shown above the dump.
        caption: String,
        /// Lowercase hex encoding of the data.
        data: String,
    },
    /// Tabular data.
    Table {
        /// Caption shown above the table.
        caption: String,
        /// Column headers.
        headers: Vec<String>,
        /// Table rows.
        rows: Vec<Vec<Value>>,
    },
    /// Pretty-printed JSON document.
    Json {
        /// Caption shown above the document.
        caption: String,
        /// Rendered document.
        data: String,
    },
}

impl Attachment {
    /// Creates a hex dump attachment.
    pub fn hex_dump(caption: impl Into<String>, data: &[u8]) -> Self {
        Self::HexDump {
            caption: caption.into(),
            data: hex::encode(data),
        }
    }

    /// Creates an empty table attachment.
    pub fn table<I, S>(caption: impl Into<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Table {
            caption: caption.into(),
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row to a table attachment. Other attachments are unchanged.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        if let Self::Table { rows, .. } = &mut self {
            rows.push(row);
        }
        self
    }

    /// Creates a JSON attachment.
    pub fn json(caption: impl Into<String>, value: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self::Json {
            caption: caption.into(),
            data: serde_json::to_string_pretty(value)?,
        })
    }
}

/// One narrated step of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    /// Unix timestamp in milliseconds.
    pub ts: i64,
    /// Narration text.
    pub msg: String,
    /// Supporting attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Whether the entry should be highlighted.
    #[serde(default)]
    pub is_important: bool,
}

/// Audit trail for a unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cause: Option<String>,
    #[serde(rename = "sid", default, skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<i64>,
    #[serde(rename = "hist", default, skip_serializing_if = "Vec::is_empty")]
    entries: Vec<JobEntry>,
    #[serde(skip)]
    is_new: bool,
}

impl Job {
    /// Starts a new job with a random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cause: None,
            sensors: Vec::new(),
            start: Some(OffsetDateTime::now_utc().unix_timestamp()),
            end: None,
            entries: Vec::new(),
            is_new: true,
        }
    }

    /// Resumes a job started by an earlier call.
    #[must_use]
    pub fn resume(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cause: None,
            sensors: Vec::new(),
            start: None,
            end: None,
            entries: Vec::new(),
            is_new: false,
        }
    }

    /// Job identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Why the job was started.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// Sensors involved in the job.
    #[must_use]
    pub fn sensors(&self) -> &[String] {
        &self.sensors
    }

    /// Narrated entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    /// Whether [`Job::close`] has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.end.is_some()
    }

    /// Records why the job was started.
    pub fn set_cause(&mut self, cause: impl Into<String>) {
        self.cause = Some(cause.into());
    }

    /// Records a sensor involved in the job.
    pub fn add_sensor(&mut self, sensor_id: impl Into<String>) -> Result<(), JobError> {
        self.ensure_open()?;
        self.sensors.push(sensor_id.into());
        Ok(())
    }

    /// Appends a narrated step.
    pub fn narrate(
        &mut self,
        message: impl Into<String>,
        attachments: Vec<Attachment>,
        is_important: bool,
    ) -> Result<(), JobError> {
        self.ensure_open()?;
        self.entries.push(JobEntry {
            ts: now_millis(),
            msg: message.into(),
            attachments,
            is_important,
        });
        Ok(())
    }

    /// Seals the job.
    pub fn close(&mut self) -> Result<(), JobError> {
        self.ensure_open()?;
        self.end = Some(now_millis());
        Ok(())
    }

    /// Checks the job can be attached to a response.
    pub fn check_attachable(&self) -> Result<(), JobError> {
        if self.is_new && self.cause.is_none() {
            return Err(JobError::MissingCause {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), JobError> {
        if self.is_closed() {
            return Err(JobError::Closed {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_jobs_get_uuid_and_start_time() {
        let job = Job::new();
        assert!(Uuid::parse_str(job.id()).is_ok());
        let value = serde_json::to_value(&job).expect("job serialises");
        assert!(value.get("start").is_some_and(Value::is_i64));
        assert!(value.get("end").is_none());
    }

    #[test]
    fn new_job_requires_cause() {
        let mut job = Job::new();
        assert!(matches!(job.check_attachable(), Err(JobError::MissingCause { .. })));
        job.set_cause("suspicious login");
        assert_eq!(job.check_attachable(), Ok(()));
    }

    #[test]
    fn resumed_job_needs_no_cause() {
        let job = Job::resume("job-1");
        assert_eq!(job.check_attachable(), Ok(()));
        assert_eq!(
            serde_json::to_value(&job).expect("job serialises"),
            json!({"id": "job-1"})
        );
    }

    #[test]
    fn narration_is_appended_in_order() {
        let mut job = Job::resume("job-1");
        job.narrate("first", Vec::new(), false).expect("open job accepts entries");
        job.narrate("second", vec![Attachment::hex_dump("bytes", b"\x01\xff")], true)
            .expect("open job accepts entries");
        job.add_sensor("sensor-a").expect("open job accepts sensors");

        let messages: Vec<&str> = job.entries().iter().map(|e| e.msg.as_str()).collect();
        assert_eq!(messages, ["first", "second"]);

        let value = serde_json::to_value(&job).expect("job serialises");
        assert_eq!(value.pointer("/sid/0"), Some(&json!("sensor-a")));
        assert_eq!(value.pointer("/hist/1/is_important"), Some(&json!(true)));
        assert_eq!(
            value.pointer("/hist/1/attachments/0"),
            Some(&json!({"att_type": "hex_dump", "caption": "bytes", "data": "01ff"}))
        );
    }

    #[test]
    fn closed_job_rejects_further_changes() {
        let mut job = Job::resume("job-1");
        job.close().expect("first close succeeds");
        assert!(job.is_closed());
        assert!(matches!(job.narrate("late", Vec::new(), false), Err(JobError::Closed { .. })));
        assert!(matches!(job.add_sensor("s"), Err(JobError::Closed { .. })));
        assert!(matches!(job.close(), Err(JobError::Closed { .. })));
    }

    #[test]
    fn table_attachment_collects_rows() {
        let table = Attachment::table("procs", ["pid", "name"])
            .with_row(vec![json!(1), json!("init")])
            .with_row(vec![json!(2), json!("sh")]);
        assert_eq!(
            serde_json::to_value(&table).expect("attachment serialises"),
            json!({
                "att_type": "table",
                "caption": "procs",
                "headers": ["pid", "name"],
                "rows": [[1, "init"], [2, "sh"]]
            })
        );
    }

    #[test]
    fn json_attachment_is_pretty_printed() {
        let attachment = Attachment::json("doc", &json!({"a": 1})).expect("value renders");
        let Attachment::Json { data, .. } = attachment else {
            panic!("expected a JSON attachment");
        };
        assert_eq!(data, "{\n  \"a\": 1\n}");
    }
}
