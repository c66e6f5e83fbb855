use std::collections::HashSet;

use thiserror::Error;

use crate::adapters::management_store::{ManagementStore, StoreError};
use crate::domain::schema::{FieldSpec, FieldValues, is_valid_identifier};

#[derive(Debug, Error)]
pub enum SchemaCreationError {
    #[error("invalid field table: {0}")]
    InvalidFieldSpec(String),
    #[error("store rejected schema provisioning: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreWriteError {
    #[error("record identity must not be empty")]
    EmptyIdentity,
    #[error("store rejected record write: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Makes sure `namespace` and `class` exist, creating them from `fields`
/// when absent. An existing class is left untouched.
pub fn ensure_schema<S>(
    store: &S,
    namespace: &str,
    class: &str,
    fields: &[FieldSpec],
) -> Result<SchemaOutcome, SchemaCreationError>
where
    S: ManagementStore + ?Sized,
{
    validate_field_spec(fields)?;

    if !store.namespace_exists(namespace)? {
        store.create_namespace(namespace)?;
        tracing::info!(namespace, "namespace created");
    }

    if let Some(existing) = store.schema_fields(namespace, class)? {
        let missing: Vec<&str> = fields
            .iter()
            .filter(|wanted| !existing.iter().any(|field| field.name == wanted.name))
            .map(|field| field.name.as_ref())
            .collect();

        if !missing.is_empty() {
            tracing::warn!(
                namespace,
                class,
                missing = ?missing,
                "existing class lacks declared fields; leaving it unchanged"
            );
        }

        return Ok(SchemaOutcome::AlreadyPresent);
    }

    store.create_schema(namespace, class, fields)?;
    tracing::info!(namespace, class, field_count = fields.len(), "class created");

    Ok(SchemaOutcome::Created)
}

/// Writes the latest values for `identity`: updates the existing record in
/// place or creates it. Not atomic across the lookup and the write.
pub fn upsert_record<S>(
    store: &S,
    namespace: &str,
    class: &str,
    identity: &str,
    fields: &FieldValues,
) -> Result<UpsertOutcome, StoreWriteError>
where
    S: ManagementStore + ?Sized,
{
    if identity.trim().is_empty() {
        return Err(StoreWriteError::EmptyIdentity);
    }

    match store.find_record(namespace, class, identity)? {
        Some(_) => {
            store.update_record(namespace, class, identity, fields)?;
            Ok(UpsertOutcome::Updated)
        }
        None => {
            store.create_record(namespace, class, identity, fields)?;
            Ok(UpsertOutcome::Created)
        }
    }
}

fn validate_field_spec(fields: &[FieldSpec]) -> Result<(), SchemaCreationError> {
    let key_count = fields.iter().filter(|field| field.is_key).count();
    if key_count != 1 {
        return Err(SchemaCreationError::InvalidFieldSpec(format!(
            "expected exactly one key field, found {key_count}"
        )));
    }

    let mut seen = HashSet::new();
    for field in fields {
        if !is_valid_identifier(&field.name) {
            return Err(SchemaCreationError::InvalidFieldSpec(format!(
                "{:?} is not a valid field name",
                field.name
            )));
        }
        // Column names are case-insensitive in the store.
        if !seen.insert(field.name.to_ascii_lowercase()) {
            return Err(SchemaCreationError::InvalidFieldSpec(format!(
                "duplicate field {}",
                field.name
            )));
        }
        if field.is_key && field.nullable {
            return Err(SchemaCreationError::InvalidFieldSpec(format!(
                "key field {} cannot be nullable",
                field.name
            )));
        }
    }

    Ok(())
}
