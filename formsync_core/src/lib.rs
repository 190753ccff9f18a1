use serde::{Deserialize, Serialize};

pub mod api;
pub mod hash;
pub mod models;
pub mod openrosa;
pub mod xform;

pub trait StrConversion {
    fn from_str(value: &str) -> Self;
    fn as_str(&self) -> &'static str;
}

/// Lifecycle of a catalog row. A row that does not exist at all is `None`
/// wherever a `FormState` would otherwise appear.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum FormState {
    #[default]
    Active,
    SoftDeleted,
}

impl std::fmt::Display for FormState {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}
impl StrConversion for FormState {
    fn from_str(value: &str) -> Self {
        match value {
            "SoftDeleted" => Self::SoftDeleted,
            _ => Self::Active,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::SoftDeleted => "SoftDeleted",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum InstanceStatus {
    #[default]
    Incomplete,
    Complete,
    Submitted,
    SubmissionFailed,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}
impl StrConversion for InstanceStatus {
    fn from_str(value: &str) -> Self {
        match value {
            "Complete" => Self::Complete,
            "Submitted" => Self::Submitted,
            "SubmissionFailed" => Self::SubmissionFailed,
            _ => Self::Incomplete,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "Incomplete",
            Self::Complete => "Complete",
            Self::Submitted => "Submitted",
            Self::SubmissionFailed => "SubmissionFailed",
        }
    }
}

/// How a server form relates to what is already on the device.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum FormDetailsType {
    OnDevice,
    New,
    UpdatedVersion,
    UpdatedHash,
    UpdatedMedia,
}

impl std::fmt::Display for FormDetailsType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}
impl StrConversion for FormDetailsType {
    fn from_str(value: &str) -> Self {
        match value {
            "New" => Self::New,
            "UpdatedVersion" => Self::UpdatedVersion,
            "UpdatedHash" => Self::UpdatedHash,
            "UpdatedMedia" => Self::UpdatedMedia,
            _ => Self::OnDevice,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::OnDevice => "OnDevice",
            Self::New => "New",
            Self::UpdatedVersion => "UpdatedVersion",
            Self::UpdatedHash => "UpdatedHash",
            Self::UpdatedMedia => "UpdatedMedia",
        }
    }
}
