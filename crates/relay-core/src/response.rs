//! Response values returned by handlers and by the dispatch core.
//!
//! Constructors uphold two invariants: a failed response always carries a
//! non-empty error, and only failed responses can be retriable. Every
//! constructor returns a fresh value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Dict;
use crate::job::{Job, JobError};

/// Error returned when no handler matches the inbound event.
pub const NOT_IMPLEMENTED: &str = "not implemented";

const UNSPECIFIED_ERROR: &str = "unspecified error";

/// Outcome of a handled call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    success: bool,
    #[serde(rename = "retry", default, skip_serializing_if = "is_false")]
    retriable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    error: String,
    #[serde(default)]
    data: Dict,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    jobs: Vec<Job>,
}

const fn is_false(value: &bool) -> bool {
    !*value
}

impl Response {
    /// Successful response carrying `data`.
    #[must_use]
    pub fn success(data: Dict) -> Self {
        Self {
            success: true,
            retriable: false,
            error: String::new(),
            data,
            jobs: Vec::new(),
        }
    }

    /// Successful response with an empty payload.
    #[must_use]
    pub fn ok() -> Self {
        Self::success(Dict::new())
    }

    /// Non-retriable failure.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::failed(error.into(), false)
    }

    /// Failure the caller may retry.
    #[must_use]
    pub fn retriable(error: impl Into<String>) -> Self {
        Self::failed(error.into(), true)
    }

    /// Non-retriable failure reporting that no handler matched.
    #[must_use]
    pub fn not_implemented() -> Self {
        Self::failure(NOT_IMPLEMENTED)
    }

    fn failed(error: String, retriable: bool) -> Self {
        let error = if error.is_empty() {
            String::from(UNSPECIFIED_ERROR)
        } else {
            error
        };
        Self {
            success: false,
            retriable,
            error,
            data: Dict::new(),
            jobs: Vec::new(),
        }
    }

    /// Adds one payload entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Attaches a job, rejecting new jobs without a cause.
    pub fn with_job(mut self, job: Job) -> Result<Self, JobError> {
        job.check_attachable()?;
        self.jobs.push(job);
        Ok(self)
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Whether the caller may retry.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        self.retriable
    }

    /// Error message of a failed response.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        if self.error.is_empty() {
            None
        } else {
            Some(&self.error)
        }
    }

    /// Response payload.
    #[must_use]
    pub const fn data(&self) -> &Dict {
        &self.data
    }

    /// Attached jobs.
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Serialises the response to its wire form.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn success_omits_optional_fields() {
        let response = Response::ok().with_data("k", "v");
        assert_eq!(
            serde_json::to_value(&response).expect("response serialises"),
            json!({"success": true, "data": {"k": "v"}})
        );
    }

    #[test]
    fn retriable_failure_sets_retry() {
        let response = Response::retriable("busy");
        assert_eq!(
            serde_json::to_value(&response).expect("response serialises"),
            json!({"success": false, "retry": true, "error": "busy", "data": {}})
        );
    }

    #[rstest]
    #[case::failure(Response::failure(""))]
    #[case::retriable(Response::retriable(String::new()))]
    fn failures_always_carry_an_error(#[case] response: Response) {
        assert!(!response.is_success());
        assert!(response.error().is_some_and(|e| !e.is_empty()));
    }

    #[test]
    fn not_implemented_returns_fresh_values() {
        let first = Response::not_implemented().with_data("mutated", true);
        let second = Response::not_implemented();
        assert_eq!(second.error(), Some(NOT_IMPLEMENTED));
        assert!(second.data().is_empty());
        assert_ne!(first, second);
        assert!(!second.is_retriable());
    }

    #[test]
    fn jobs_are_serialised_when_present() {
        let mut job = Job::new();
        job.set_cause("investigation");
        let id = job.id().to_owned();
        let response = Response::ok().with_job(job).expect("job with cause attaches");
        let value = serde_json::to_value(&response).expect("response serialises");
        assert_eq!(value.pointer("/jobs/0/id"), Some(&json!(id)));
        assert_eq!(value.pointer("/jobs/0/cause"), Some(&json!("investigation")));
    }

    #[test]
    fn new_job_without_cause_is_rejected() {
        let error = Response::ok()
            .with_job(Job::new())
            .expect_err("cause is required");
        assert!(matches!(error, JobError::MissingCause { .. }));
    }
}
