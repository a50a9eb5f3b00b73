//! Artifact descriptors
//!
//! An [`ArtifactDescriptor`] is an immutable value describing one artifact
//! request. Two descriptors with the same `id` but different `update_time`
//! are different versions and live in different cache directories.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Plain file resource (scripts, jars, config bundles).
    #[default]
    #[serde(alias = "FILE")]
    File,
    /// User-defined function package.
    #[serde(alias = "UDF")]
    Udf,
}

impl ResourceType {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file" => Some(Self::File),
            "udf" => Some(Self::Udf),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Udf => "udf",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the resource relates to the task that asked for it.
///
/// Only `Normal` (requested directly) is produced today. New relationship
/// kinds will be added as variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ReferredType {
    /// Directly requested by the task.
    #[default]
    Normal,
}

/// Persisted resource record as supplied by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Resource identity
    pub id: u32,
    /// Resource category
    #[serde(rename = "type", default)]
    pub resource_type: ResourceType,
    /// Fully qualified remote name (e.g. "/scripts/etl/run.sh")
    pub full_name: String,
    /// Owning tenant
    pub tenant_code: String,
    /// Last update at the source of truth
    pub update_time: DateTime<Utc>,
}

/// Immutable description of one artifact request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Resource category
    pub resource_type: ResourceType,
    /// Relationship to the requesting task
    #[serde(default)]
    pub referred_type: ReferredType,
    /// Artifact identity, stable across versions
    pub id: u32,
    /// Logical name; appended verbatim to the download directory
    pub name: String,
    /// Fully qualified remote name
    pub full_name: String,
    /// Directory portion of `full_name` ("" when there is none)
    pub parent_relative_path: String,
    /// Tenant namespace used for remote resolution
    pub tenant_code: String,
    /// Version stamp source
    pub update_time: DateTime<Utc>,
}

impl ArtifactDescriptor {
    /// Create a descriptor for a directly requested resource.
    ///
    /// Both `name` and `full_name` are set to `full_name`, and the parent
    /// relative path is derived from it.
    pub fn new(
        resource_type: ResourceType,
        id: u32,
        full_name: impl Into<String>,
        tenant_code: impl Into<String>,
        update_time: DateTime<Utc>,
    ) -> Self {
        let full_name = full_name.into();
        Self {
            resource_type,
            referred_type: ReferredType::Normal,
            id,
            name: full_name.clone(),
            parent_relative_path: parent_relative_path(&full_name).to_string(),
            full_name,
            tenant_code: tenant_code.into(),
            update_time,
        }
    }

    /// Build a descriptor from a persisted resource record.
    pub fn from_record(record: &ResourceRecord) -> Self {
        Self::new(
            record.resource_type,
            record.id,
            record.full_name.clone(),
            record.tenant_code.clone(),
            record.update_time,
        )
    }
}

impl From<&ResourceRecord> for ArtifactDescriptor {
    fn from(record: &ResourceRecord) -> Self {
        Self::from_record(record)
    }
}

impl fmt::Display for ArtifactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.resource_type, self.id, self.name)
    }
}

/// Directory portion of a full resource name.
///
/// Everything before the last `/`, or "" when the last `/` is at index 0 or
/// absent. So "/a.sh" has no parent, while "/dir/a.sh" has parent "/dir".
pub fn parent_relative_path(full_name: &str) -> &str {
    match full_name.rfind('/') {
        Some(last) if last > 0 => &full_name[..last],
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn update_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parent_relative_path() {
        assert_eq!(parent_relative_path("/dir/sub/run.sh"), "/dir/sub");
        assert_eq!(parent_relative_path("/run.sh"), "");
        assert_eq!(parent_relative_path("run.sh"), "");
        assert_eq!(parent_relative_path("dir/run.sh"), "dir");
        assert_eq!(parent_relative_path(""), "");
    }

    #[test]
    fn test_from_record() {
        let record = ResourceRecord {
            id: 42,
            resource_type: ResourceType::File,
            full_name: "/etl/jobs/load.jar".to_string(),
            tenant_code: "analytics".to_string(),
            update_time: update_time(),
        };

        let descriptor = ArtifactDescriptor::from_record(&record);
        assert_eq!(descriptor.id, 42);
        assert_eq!(descriptor.resource_type, ResourceType::File);
        assert_eq!(descriptor.referred_type, ReferredType::Normal);
        assert_eq!(descriptor.name, "/etl/jobs/load.jar");
        assert_eq!(descriptor.full_name, "/etl/jobs/load.jar");
        assert_eq!(descriptor.parent_relative_path, "/etl/jobs");
        assert_eq!(descriptor.tenant_code, "analytics");
        assert_eq!(descriptor.update_time, update_time());
    }

    #[test]
    fn test_display_label() {
        let descriptor =
            ArtifactDescriptor::new(ResourceType::Udf, 7, "/udf/f.jar", "t1", update_time());
        assert_eq!(descriptor.to_string(), "udf-7-/udf/f.jar");
    }

    #[test]
    fn test_resource_type_parsing() {
        assert_eq!(ResourceType::from_str("FILE"), Some(ResourceType::File));
        assert_eq!(ResourceType::from_str("udf"), Some(ResourceType::Udf));
        assert_eq!(ResourceType::from_str("archive"), None);
    }

    #[test]
    fn test_record_deserialization() {
        let record: ResourceRecord = serde_json::from_str(
            r#"{
                "id": 3,
                "type": "udf",
                "full_name": "/f.jar",
                "tenant_code": "t",
                "update_time": "2024-05-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(record.resource_type, ResourceType::Udf);
        assert_eq!(record.update_time, update_time());
    }
}
