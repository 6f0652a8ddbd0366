//! Opaque job identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Number of random characters appended to the timestamp component.
const SUFFIX_LEN: usize = 8;

/// Unique token identifying one submitted task or one scoped job.
///
/// The shape is `job-<epoch millis>-<random suffix>`. Uniqueness, not
/// ordering, is the only invariant callers may rely on; the id doubles as
/// the name of a scoped job directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        let mut suffix = uuid::Uuid::new_v4().simple().to_string();
        suffix.truncate(SUFFIX_LEN);
        Self(format!("job-{}-{suffix}", now_ms()))
    }

    /// View the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_ids_have_expected_shape() {
        let id = JobId::generate();
        assert!(id.as_str().starts_with("job-"));
        assert_eq!(id.as_str().split('-').count(), 3);
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<JobId> = (0..256).map(|_| JobId::generate()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn serde_is_transparent() {
        let id = JobId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
