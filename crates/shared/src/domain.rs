use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(FarmerId);
id_newtype!(EmployeeId);
id_newtype!(RegistrationId);

/// Canonical KYC verification states.
///
/// Backends disagree on casing and spelling, so deserialization always goes
/// through [`KycStatus::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    #[default]
    NotStarted,
    Pending,
    Approved,
    ReferBack,
    Rejected,
}

impl KycStatus {
    pub const ALL: [KycStatus; 5] = [
        KycStatus::NotStarted,
        KycStatus::Pending,
        KycStatus::Approved,
        KycStatus::ReferBack,
        KycStatus::Rejected,
    ];

    /// Strict parse of a raw status string; `None` for anything unrecognized.
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();

        match key.as_str() {
            "NOT_STARTED" | "NOTSTARTED" => Some(Self::NotStarted),
            "PENDING" | "IN_PROGRESS" | "SUBMITTED" => Some(Self::Pending),
            "APPROVED" | "VERIFIED" => Some(Self::Approved),
            "REFER_BACK" | "REFERBACK" | "REFERRED_BACK" => Some(Self::ReferBack),
            "REJECTED" | "DECLINED" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Lenient ingest: unknown values collapse to `NotStarted`.
    pub fn normalize(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::NotStarted;
        }
        Self::parse(raw).unwrap_or_else(|| {
            warn!(raw, "unrecognized kyc status; treating as NOT_STARTED");
            Self::NotStarted
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::ReferBack => "REFER_BACK",
            Self::Rejected => "REJECTED",
        }
    }

    /// NOT_STARTED and PENDING both count as waiting on a reviewer.
    pub fn is_awaiting_action(self) -> bool {
        matches!(self, Self::NotStarted | Self::Pending)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for KycStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Self::default(),
            Value::String(raw) => Self::normalize(&raw),
            other => Self::normalize(&other.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationRole {
    Farmer,
    Employee,
    Fpo,
}

impl<'de> Deserialize<'de> for RegistrationRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_uppercase().as_str() {
            "FARMER" => Ok(Self::Farmer),
            "EMPLOYEE" => Ok(Self::Employee),
            "FPO" => Ok(Self::Fpo),
            _ => Err(de::Error::unknown_variant(
                &raw,
                &["FARMER", "EMPLOYEE", "FPO"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RegistrationStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = match Value::deserialize(deserializer)? {
            Value::Null => return Ok(Self::default()),
            Value::String(raw) => raw,
            other => other.to_string(),
        };
        Ok(match raw.trim().to_ascii_uppercase().as_str() {
            "" | "PENDING" => Self::Pending,
            "APPROVED" => Self::Approved,
            "REJECTED" => Self::Rejected,
            _ => {
                warn!(raw = %raw, "unrecognized registration status; treating as PENDING");
                Self::Pending
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDocuments {
    #[serde(default, alias = "aadhaar_number", skip_serializing_if = "Option::is_none")]
    pub aadhaar_number: Option<String>,
    #[serde(default, alias = "pan_number", skip_serializing_if = "Option::is_none")]
    pub pan_number: Option<String>,
}

impl KycDocuments {
    pub fn new(aadhaar_number: impl Into<String>, pan_number: impl Into<String>) -> Self {
        Self {
            aadhaar_number: Some(aadhaar_number.into()),
            pan_number: Some(pan_number.into()),
        }
    }
}

/// A farmer as returned by any list endpoint. The KYC case lives inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farmer {
    pub id: FarmerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "kyc_status")]
    pub kyc_status: KycStatus,
    #[serde(
        default,
        alias = "assigned_employee_ref",
        alias = "assignedEmployee",
        alias = "assigned_employee",
        deserialize_with = "lenient_reference"
    )]
    pub assigned_employee_ref: Option<String>,
    #[serde(
        default,
        alias = "assignment_date",
        deserialize_with = "lenient_datetime"
    )]
    pub assignment_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "aadhaar_number")]
    pub aadhaar_number: Option<String>,
    #[serde(default, alias = "pan_number")]
    pub pan_number: Option<String>,
    #[serde(default, alias = "kyc_reason")]
    pub kyc_reason: Option<String>,
    #[serde(default, alias = "reviewed_by")]
    pub reviewed_by: Option<String>,
    #[serde(default, alias = "reviewed_at", deserialize_with = "lenient_datetime")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Farmer {
    pub fn documents(&self) -> KycDocuments {
        KycDocuments {
            aadhaar_number: self.aadhaar_number.clone(),
            pan_number: self.pan_number.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: RegistrationId,
    #[serde(default)]
    pub name: String,
    pub role: RegistrationRole,
    #[serde(default)]
    pub status: RegistrationStatus,
    #[serde(default, alias = "submitted_at", deserialize_with = "lenient_datetime")]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    Admin,
    Employee,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: String,
    pub name: String,
    pub role: ReviewerRole,
}

/// A list body whose rows are decoded one at a time. Rows that still fail
/// (missing id, unknown role) are logged and skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct LenientRows<T>(pub Vec<T>);

impl<T> LenientRows<T> {
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for LenientRows<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rows = Vec::<Value>::deserialize(deserializer)?;
        let decoded = rows
            .into_iter()
            .enumerate()
            .filter_map(|(index, row)| match serde_json::from_value::<T>(row) {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    warn!(
                        index,
                        kind = std::any::type_name::<T>(),
                        error = %err,
                        "skipping undecodable row"
                    );
                    None
                }
            })
            .collect();
        Ok(Self(decoded))
    }
}

/// Legacy rows store the assignee as a string (id, name or contact) or a bare number.
fn lenient_reference<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(raw) => Some(raw),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::String(raw) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
        Err(err) => {
            warn!(raw = %raw, error = %err, "dropping unparseable timestamp");
            Ok(None)
        }
    }
}
