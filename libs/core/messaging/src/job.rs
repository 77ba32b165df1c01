//! Job trait for background job processing.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A job that can be processed by a worker.
///
/// # Required Methods
///
/// - `job_id`: Unique identifier for the job
/// - `retry_count`: Current retry count
/// - `with_retry`: Create a copy with incremented retry count
pub trait Job: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Get the unique job ID.
    ///
    /// This should be a stable identifier that doesn't change across retries.
    fn job_id(&self) -> String;

    /// Get the current retry count.
    ///
    /// Starts at 0 for a new job.
    fn retry_count(&self) -> u32;

    /// Create a new instance with incremented retry count.
    fn with_retry(&self) -> Self;

    /// Get the maximum number of retries (default: 3).
    fn max_retries(&self) -> u32 {
        3
    }

    /// Check if the job can be retried.
    fn can_retry(&self) -> bool {
        self.retry_count() < self.max_retries()
    }

    /// Get the job priority (default: Normal).
    ///
    /// Higher priority jobs are drained first by the stream worker.
    fn priority(&self) -> JobPriority {
        JobPriority::Normal
    }

    /// Get the job type name (for logging and metrics).
    fn job_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Job priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// Low priority - processed last
    Low,
    /// Normal priority (default)
    #[default]
    Normal,
    /// High priority - processed first
    High,
}

impl JobPriority {
    /// Get the numeric priority value (higher = more important).
    pub fn value(&self) -> u8 {
        match self {
            JobPriority::Low => 0,
            JobPriority::Normal => 1,
            JobPriority::High => 2,
        }
    }

    /// All priorities, highest first. Drain order for multi-stream consumers.
    pub fn descending() -> [JobPriority; 3] {
        [JobPriority::High, JobPriority::Normal, JobPriority::Low]
    }

    /// Short name used in stream keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
        }
    }
}

impl std::str::FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(JobPriority::Low),
            "normal" => Ok(JobPriority::Normal),
            "high" => Ok(JobPriority::High),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct TestJob {
        id: String,
        retry_count: u32,
    }

    impl Job for TestJob {
        fn job_id(&self) -> String {
            self.id.clone()
        }

        fn retry_count(&self) -> u32 {
            self.retry_count
        }

        fn with_retry(&self) -> Self {
            Self {
                id: self.id.clone(),
                retry_count: self.retry_count + 1,
            }
        }
    }

    #[test]
    fn test_job_trait() {
        let job = TestJob {
            id: "job-1".to_string(),
            retry_count: 0,
        };

        assert_eq!(job.job_id(), "job-1");
        assert_eq!(job.retry_count(), 0);
        assert!(job.can_retry());
        assert_eq!(job.max_retries(), 3);

        let retried = job.with_retry();
        assert_eq!(retried.retry_count(), 1);
        assert!(retried.can_retry());

        let at_max = TestJob {
            id: "job-2".to_string(),
            retry_count: 3,
        };
        assert!(!at_max.can_retry());
    }

    #[test]
    fn test_job_priority_ordering() {
        assert!(JobPriority::Low < JobPriority::Normal);
        assert!(JobPriority::Normal < JobPriority::High);
    }

    #[test]
    fn test_priority_roundtrip() {
        assert_eq!("high".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert_eq!("LOW".parse::<JobPriority>().unwrap(), JobPriority::Low);
        assert!("urgent".parse::<JobPriority>().is_err());
        assert_eq!(JobPriority::Normal.as_str(), "normal");
    }

    #[test]
    fn test_priority_descending() {
        let order = JobPriority::descending();
        assert_eq!(order[0], JobPriority::High);
        assert_eq!(order[2], JobPriority::Low);
    }
}
