use thiserror::Error;

use crate::domain::schema::{FieldSpec, FieldValues};

pub trait ManagementStore {
    fn namespace_exists(&self, namespace: &str) -> Result<bool, StoreError>;
    fn create_namespace(&self, namespace: &str) -> Result<(), StoreError>;
    fn schema_fields(
        &self,
        namespace: &str,
        class: &str,
    ) -> Result<Option<Vec<FieldSpec>>, StoreError>;
    fn create_schema(
        &self,
        namespace: &str,
        class: &str,
        fields: &[FieldSpec],
    ) -> Result<(), StoreError>;
    fn find_record(
        &self,
        namespace: &str,
        class: &str,
        key: &str,
    ) -> Result<Option<FieldValues>, StoreError>;
    fn create_record(
        &self,
        namespace: &str,
        class: &str,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), StoreError>;
    /// Overwrites only the supplied fields of the record with `key`.
    fn update_record(
        &self,
        namespace: &str,
        class: &str,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare store location: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported store version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("namespace {0} does not exist")]
    UnknownNamespace(String),
    #[error("class {class} does not exist in namespace {namespace}")]
    UnknownClass { namespace: String, class: String },
    #[error("class {class} already exists in namespace {namespace}")]
    ClassExists { namespace: String, class: String },
    #[error("class {class} has no field named {field}")]
    UnknownField { class: String, field: String },
    #[error("field {field} expects {expected} values")]
    FieldTypeMismatch { field: String, expected: String },
    #[error("field {0} is not nullable")]
    NullNotAllowed(String),
    #[error("no record with key {key:?} in class {class}")]
    RecordNotFound { class: String, key: String },
    #[error("stored catalog entry is corrupt: {0}")]
    CorruptCatalog(String),
}
