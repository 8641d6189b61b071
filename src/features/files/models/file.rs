use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;

use crate::core::error::{AppError, Result};

/// Fields a client may change through the update endpoint
pub const ALLOWED_UPDATE_FIELDS: &[&str] = &["name", "description", "tags"];

/// Fields owned by the metadata store; never taken from a patch
pub const PROTECTED_FIELDS: &[&str] = &["id", "created_at", "updated_at", "version"];

/// Visibility of a record. Only `Active` records are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Active,
    /// Tombstone: blob removal in progress, record still readable by id
    DeletedPending,
    Deleted,
}

#[derive(Debug, Error)]
#[error("unknown file status '{0}'")]
pub struct UnknownStatus(String);

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::DeletedPending => "deleted_pending",
            FileStatus::Deleted => "deleted",
        }
    }
}

impl TryFrom<String> for FileStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(FileStatus::Active),
            "deleted_pending" => Ok(FileStatus::DeletedPending),
            "deleted" => Ok(FileStatus::Deleted),
            _ => Err(UnknownStatus(value)),
        }
    }
}

/// Metadata row for one stored file
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub content_type: String,
    #[sqlx(try_from = "String")]
    pub status: FileStatus,
    pub s3_key: String,
    /// OCC token: 1 on create, +1 on every successful update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl FileRecord {
    pub fn is_active(&self) -> bool {
        self.status == FileStatus::Active
    }
}

/// Everything a caller supplies on create; the store fills in
/// `version`, `created_at` and `updated_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileRecord {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub content_type: String,
    pub status: FileStatus,
    pub s3_key: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl NewFileRecord {
    pub fn into_record(self, now: DateTime<Utc>) -> FileRecord {
        FileRecord {
            id: self.id,
            name: self.name,
            size: self.size,
            content_type: self.content_type,
            status: self.status,
            s3_key: self.s3_key,
            version: 1,
            created_at: now,
            updated_at: now,
            description: self.description,
            tags: self.tags,
        }
    }
}

/// Mutable-field patch understood by the metadata store.
///
/// `size`, `content_type`, `s3_key` and the protected fields have no slot
/// here, so no patch can touch them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilePatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<FileStatus>,
}

impl FilePatch {
    pub fn status(status: FileStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Build a patch from a client JSON object, keeping only
    /// [`ALLOWED_UPDATE_FIELDS`]. Other keys are dropped without error;
    /// allowed keys with the wrong shape are rejected.
    pub fn from_allowed_fields(raw: &Map<String, Value>) -> Result<Self> {
        let mut patch = FilePatch::default();

        for (key, value) in raw {
            let key = key.as_str();
            if !ALLOWED_UPDATE_FIELDS.contains(&key) {
                if PROTECTED_FIELDS.contains(&key) {
                    tracing::debug!("Ignoring store-managed field '{}' in patch", key);
                } else {
                    tracing::debug!("Dropping non-updatable field '{}' from patch", key);
                }
                continue;
            }

            match key {
                "name" => {
                    let name = value
                        .as_str()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| {
                            AppError::Validation("name must be a non-empty string".to_string())
                        })?;
                    patch.name = Some(name.to_string());
                }
                "description" => {
                    patch.description = Some(match value {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        _ => {
                            return Err(AppError::Validation(
                                "description must be a string or null".to_string(),
                            ))
                        }
                    });
                }
                "tags" => patch.tags = Some(parse_tags(value)?),
                _ => {}
            }
        }

        Ok(patch)
    }

    /// Apply the fields present in this patch to `record`
    pub fn apply_to(&self, record: &mut FileRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
    }
}

fn parse_tags(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    AppError::Validation("tags must be an array of strings".to_string())
                })
            })
            .collect(),
        _ => Err(AppError::Validation(
            "tags must be an array of strings".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            FileStatus::Active,
            FileStatus::DeletedPending,
            FileStatus::Deleted,
        ] {
            let parsed = FileStatus::try_from(status.as_str().to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert!(FileStatus::try_from("archived".to_string()).is_err());
    }

    #[test]
    fn test_patch_keeps_only_allowed_fields() {
        let raw = as_map(json!({
            "name": "y.txt",
            "description": "quarterly report",
            "tags": ["finance", "q3"],
            "id": "other",
            "size": 999,
            "content_type": "text/html",
            "version": 7,
            "status": "deleted"
        }));

        let patch = FilePatch::from_allowed_fields(&raw).unwrap();

        assert_eq!(
            patch,
            FilePatch {
                name: Some("y.txt".to_string()),
                description: Some(Some("quarterly report".to_string())),
                tags: Some(vec!["finance".to_string(), "q3".to_string()]),
                status: None,
            }
        );
    }

    #[test]
    fn test_allowed_and_protected_fields_are_disjoint() {
        for field in ALLOWED_UPDATE_FIELDS {
            assert!(!PROTECTED_FIELDS.contains(field));
        }
    }

    #[test]
    fn test_patch_null_description_clears() {
        let raw = as_map(json!({ "description": null }));
        let patch = FilePatch::from_allowed_fields(&raw).unwrap();
        assert_eq!(patch.description, Some(None));
    }

    #[test]
    fn test_patch_rejects_malformed_allowed_fields() {
        let bad = [
            json!({ "name": "" }),
            json!({ "name": 12 }),
            json!({ "description": ["a"] }),
            json!({ "tags": "finance" }),
            json!({ "tags": [1, 2] }),
        ];

        for raw in bad {
            let err = FilePatch::from_allowed_fields(&as_map(raw.clone())).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{raw}");
        }
    }
}
