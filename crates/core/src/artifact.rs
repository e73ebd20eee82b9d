//! Registered endpoint definitions.
//!
//! An [`Artifact`] binds a `(path, method)` pair to snippet source. The
//! router never holds artifacts itself: every request resolves the pair
//! against the registry, so edits take effect without a restart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{DbId, Timestamp};

/// Path prefixes owned by the management surface. Artifacts may not shadow them.
pub const RESERVED_PATH_PREFIXES: [&str; 5] = [
    "/api/manage",
    "/api/jobs",
    "/api/executions",
    "/api/logs",
    "/health",
];

/// Maximum accepted length of an artifact path.
const MAX_PATH_LEN: usize = 512;

/// Maximum accepted length of an artifact name.
const MAX_NAME_LEN: usize = 200;

// ---------------------------------------------------------------------------
// HttpMethod
// ---------------------------------------------------------------------------

/// The closed set of methods an artifact can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry a JSON body worth parsing.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = CoreError;

    /// Case-insensitive: `"get"`, `"Get"` and `"GET"` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unsupported method '{s}' (expected one of GET, POST, PUT, PATCH, DELETE)"
                ))
            })
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(value: HttpMethod) -> Self {
        value.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// A registered `(path, method) -> snippet source` definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub path: String,
    pub method: HttpMethod,
    pub source: String,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a new artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateArtifact {
    pub name: String,
    pub description: Option<String>,
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    pub source: String,
}

/// DTO for updating an artifact. All fields are optional; an empty update
/// still bumps `updated_at`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArtifact {
    pub name: Option<String>,
    pub description: Option<String>,
    pub path: Option<String>,
    pub method: Option<HttpMethod>,
    pub source: Option<String>,
    pub enabled: Option<bool>,
}

impl CreateArtifact {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name(&self.name)?;
        validate_path(&self.path)
    }
}

impl UpdateArtifact {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(path) = &self.path {
            validate_path(path)?;
        }
        Ok(())
    }

    /// Apply the present fields to `artifact` and stamp `updated_at`.
    pub fn apply_to(&self, artifact: &mut Artifact, now: Timestamp) {
        if let Some(name) = &self.name {
            artifact.name = name.clone();
        }
        if let Some(description) = &self.description {
            artifact.description = Some(description.clone());
        }
        if let Some(path) = &self.path {
            artifact.path = path.clone();
        }
        if let Some(method) = self.method {
            artifact.method = method;
        }
        if let Some(source) = &self.source {
            artifact.source = source.clone();
        }
        if let Some(enabled) = self.enabled {
            artifact.enabled = enabled;
        }
        artifact.updated_at = now;
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("name is required".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Check that `path` is an absolute URL path that does not collide with the
/// management surface.
pub fn validate_path(path: &str) -> CoreResult<()> {
    if !path.starts_with('/') {
        return Err(CoreError::Validation("path must start with '/'".into()));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(CoreError::Validation(format!(
            "path must be at most {MAX_PATH_LEN} characters"
        )));
    }
    if path.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
        return Err(CoreError::Validation(
            "path must not contain whitespace, '?' or '#'".into(),
        ));
    }
    if let Some(prefix) = RESERVED_PATH_PREFIXES
        .iter()
        .find(|p| path == **p || path.starts_with(&format!("{p}/")))
    {
        return Err(CoreError::Validation(format!(
            "path '{path}' is reserved by the management prefix '{prefix}'"
        )));
    }
    Ok(())
}
