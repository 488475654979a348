use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

/// Resource path of the jobs list.
pub const JOBS_PATH: &str = "/api/jobs";
/// Resource path of the projects list.
pub const PROJECTS_PATH: &str = "/api/projects";
/// Resource path of search results.
pub const SEARCH_PATH: &str = "/api/search";

/// Structured cache key: ordered path segments naming a resource and optional
/// sub-resources, e.g. `["/api/projects", "p1", "graph"]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Key from arbitrary segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The cached job list.
    pub fn jobs() -> Self {
        Self::new([JOBS_PATH])
    }

    /// The cached project list.
    pub fn projects() -> Self {
        Self::new([PROJECTS_PATH])
    }

    /// All cached search results.
    pub fn search() -> Self {
        Self::new([SEARCH_PATH])
    }

    /// The cached knowledge graph of one project.
    pub fn project_graph(project_id: &ProjectId) -> Self {
        Self::new([PROJECTS_PATH, project_id.as_str(), "graph"])
    }

    /// Append a segment.
    #[must_use]
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// The key's segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `prefix` names this key or one of its ancestors.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Request path the key resolves to (segments joined by `/`).
    pub fn path(&self) -> String {
        self.0.join("/")
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}
