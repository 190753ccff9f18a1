use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Hash, Eq, PartialOrd, Ord, Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ProjectId(pub String);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        ProjectId(value.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Hash, Eq, PartialOrd, Ord, Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct FormDbId(pub i64);

impl std::fmt::Display for FormDbId {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Hash, Eq, PartialOrd, Ord, Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct InstanceDbId(pub i64);

/// Header every OpenRosa request and response carries (`X-OpenRosa-Version`).
pub const OPEN_ROSA_VERSION_HEADER: &str = "x-openrosa-version";
pub const OPEN_ROSA_VERSION: &str = "1.0";
