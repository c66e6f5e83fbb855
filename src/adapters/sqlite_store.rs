use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, ToSql, params};

use crate::adapters::management_store::{ManagementStore, StoreError};
use crate::domain::schema::{
    FieldKind, FieldSpec, FieldValue, FieldValues, is_valid_identifier, namespace_lineage,
    normalize_namespace,
};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS namespaces (
    path TEXT COLLATE NOCASE PRIMARY KEY,
    parent TEXT COLLATE NOCASE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_classes (
    namespace TEXT COLLATE NOCASE NOT NULL,
    name TEXT COLLATE NOCASE NOT NULL,
    table_name TEXT UNIQUE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (namespace, name)
);

CREATE TABLE IF NOT EXISTS schema_fields (
    namespace TEXT COLLATE NOCASE NOT NULL,
    class_name TEXT COLLATE NOCASE NOT NULL,
    position INTEGER NOT NULL,
    name TEXT COLLATE NOCASE NOT NULL,
    kind TEXT NOT NULL,
    nullable INTEGER NOT NULL,
    is_key INTEGER NOT NULL,
    PRIMARY KEY (namespace, class_name, name)
);
"#,
)];

pub fn open_connection(path: &str) -> Result<Connection, StoreError> {
    Connection::open(path).map_err(StoreError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), StoreError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, StoreError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub struct SqliteStore {
    connection: Connection,
}

#[derive(Debug)]
struct ClassCatalog {
    table_name: String,
    fields: Vec<FieldSpec>,
}

impl ClassCatalog {
    fn key_field(&self) -> Result<&FieldSpec, StoreError> {
        self.fields
            .iter()
            .find(|field| field.is_key)
            .ok_or_else(|| StoreError::CorruptCatalog(format!("{} has no key field", self.table_name)))
    }

    fn value_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| !field.is_key)
    }

    fn validate_values(&self, class: &str, values: &FieldValues) -> Result<(), StoreError> {
        for (name, value) in values {
            let field = self
                .value_fields()
                .find(|field| field.name == name.as_str())
                .ok_or_else(|| StoreError::UnknownField {
                    class: class.to_string(),
                    field: name.clone(),
                })?;

            if !value.matches_kind(field.kind) {
                return Err(StoreError::FieldTypeMismatch {
                    field: name.clone(),
                    expected: field.kind.to_string(),
                });
            }

            if *value == FieldValue::Null && !field.nullable {
                return Err(StoreError::NullNotAllowed(name.clone()));
            }
        }

        Ok(())
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(value) => ToSqlOutput::from(value.as_str()),
            Self::UInt32(value) => ToSqlOutput::from(i64::from(*value)),
            Self::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut connection = open_connection(path)?;
        run_migrations(&mut connection)?;
        Ok(Self { connection })
    }

    pub fn open_read_only(path: &str) -> Result<Self, StoreError> {
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let current = schema_version(&connection)?;
        if current != LATEST_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                current,
                latest: LATEST_SCHEMA_VERSION,
            });
        }
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn list_records(
        &self,
        namespace: &str,
        class: &str,
    ) -> Result<Vec<(String, FieldValues)>, StoreError> {
        let namespace = canonical_namespace(namespace)?;
        let catalog = self.require_class(&namespace, class)?;
        let key_field = catalog.key_field()?;
        let value_fields: Vec<&FieldSpec> = catalog.value_fields().collect();

        let mut columns = vec![quote(&key_field.name)];
        columns.extend(value_fields.iter().map(|field| quote(&field.name)));

        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            quote(&catalog.table_name),
            quote(&key_field.name)
        );
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement.query_map([], |row| {
            let key: String = row.get(0)?;
            Ok((key, read_values(row, 1, &value_fields)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }

    fn load_class(&self, namespace: &str, class: &str) -> Result<Option<ClassCatalog>, StoreError> {
        let table_name: Option<Option<String>> = self
            .connection
            .query_row(
                "SELECT table_name FROM schema_classes WHERE namespace = ?1 AND name = ?2",
                params![namespace, class],
                |row| row.get(0),
            )
            .optional()?;

        let Some(table_name) = table_name else {
            return Ok(None);
        };
        let table_name = table_name.ok_or_else(|| {
            StoreError::CorruptCatalog(format!("{namespace}:{class} has no record table"))
        })?;

        let mut statement = self.connection.prepare(
            "SELECT name, kind, nullable, is_key
             FROM schema_fields
             WHERE namespace = ?1 AND class_name = ?2
             ORDER BY position",
        )?;
        let rows = statement.query_map(params![namespace, class], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;

        let mut fields = Vec::new();
        for row in rows {
            let (name, kind, nullable, is_key) = row?;
            let kind = FieldKind::parse(&kind).ok_or_else(|| {
                StoreError::CorruptCatalog(format!("field {name} has unknown kind {kind}"))
            })?;
            fields.push(FieldSpec {
                name: name.into(),
                kind,
                nullable,
                is_key,
            });
        }

        Ok(Some(ClassCatalog { table_name, fields }))
    }

    fn require_class(&self, namespace: &str, class: &str) -> Result<ClassCatalog, StoreError> {
        self.load_class(namespace, class)?
            .ok_or_else(|| StoreError::UnknownClass {
                namespace: namespace.to_string(),
                class: class.to_string(),
            })
    }
}

impl ManagementStore for SqliteStore {
    fn namespace_exists(&self, namespace: &str) -> Result<bool, StoreError> {
        let namespace = canonical_namespace(namespace)?;
        let count: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM namespaces WHERE path = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        let namespace = canonical_namespace(namespace)?;
        let created_at = now_iso8601();
        let transaction = self.connection.unchecked_transaction()?;

        for path in namespace_lineage(&namespace).iter().rev() {
            let parent = path.rfind('\\').map(|index| &path[..index]);
            transaction.execute(
                "INSERT OR IGNORE INTO namespaces (path, parent, created_at) VALUES (?1, ?2, ?3)",
                params![path, parent, created_at],
            )?;
        }

        transaction.commit()?;
        Ok(())
    }

    fn schema_fields(
        &self,
        namespace: &str,
        class: &str,
    ) -> Result<Option<Vec<FieldSpec>>, StoreError> {
        let namespace = canonical_namespace(namespace)?;
        Ok(self
            .load_class(&namespace, class)?
            .map(|catalog| catalog.fields))
    }

    fn create_schema(
        &self,
        namespace: &str,
        class: &str,
        fields: &[FieldSpec],
    ) -> Result<(), StoreError> {
        let namespace = canonical_namespace(namespace)?;
        ensure_identifier(class)?;
        for field in fields {
            ensure_identifier(&field.name)?;
            if field.is_key && field.kind != FieldKind::String {
                return Err(StoreError::FieldTypeMismatch {
                    field: field.name.to_string(),
                    expected: FieldKind::String.to_string(),
                });
            }
        }

        if !self.namespace_exists(&namespace)? {
            return Err(StoreError::UnknownNamespace(namespace));
        }
        if self.load_class(&namespace, class)?.is_some() {
            return Err(StoreError::ClassExists {
                namespace,
                class: class.to_string(),
            });
        }

        let transaction = self.connection.unchecked_transaction()?;
        transaction.execute(
            "INSERT INTO schema_classes (namespace, name, table_name, created_at) VALUES (?1, ?2, NULL, ?3)",
            params![namespace, class, now_iso8601()],
        )?;
        let table_name = format!("class_records_{}", transaction.last_insert_rowid());
        transaction.execute(
            "UPDATE schema_classes SET table_name = ?1 WHERE namespace = ?2 AND name = ?3",
            params![table_name, namespace, class],
        )?;

        for (position, field) in fields.iter().enumerate() {
            transaction.execute(
                "INSERT INTO schema_fields (namespace, class_name, position, name, kind, nullable, is_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    namespace,
                    class,
                    position as i64,
                    field.name.as_ref(),
                    field.kind.as_str(),
                    field.nullable,
                    field.is_key,
                ],
            )?;
        }

        let columns: Vec<String> = fields.iter().map(column_definition).collect();
        transaction.execute_batch(&format!(
            "CREATE TABLE {} ({});",
            quote(&table_name),
            columns.join(", ")
        ))?;

        transaction.commit()?;
        Ok(())
    }

    fn find_record(
        &self,
        namespace: &str,
        class: &str,
        key: &str,
    ) -> Result<Option<FieldValues>, StoreError> {
        let namespace = canonical_namespace(namespace)?;
        let catalog = self.require_class(&namespace, class)?;
        let key_field = catalog.key_field()?;
        let value_fields: Vec<&FieldSpec> = catalog.value_fields().collect();

        let mut columns = vec!["1".to_string()];
        columns.extend(value_fields.iter().map(|field| quote(&field.name)));

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            columns.join(", "),
            quote(&catalog.table_name),
            quote(&key_field.name)
        );

        self.connection
            .query_row(&sql, params![key], |row| read_values(row, 1, &value_fields))
            .optional()
            .map_err(StoreError::from)
    }

    fn create_record(
        &self,
        namespace: &str,
        class: &str,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), StoreError> {
        let namespace = canonical_namespace(namespace)?;
        let catalog = self.require_class(&namespace, class)?;
        catalog.validate_values(class, values)?;
        let key_field = catalog.key_field()?;

        let mut columns = vec![quote(&key_field.name)];
        columns.extend(values.keys().map(|name| quote(name)));
        let placeholders: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();

        let mut parameters: Vec<&dyn ToSql> = vec![&key];
        parameters.extend(values.values().map(|value| value as &dyn ToSql));

        self.connection.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&catalog.table_name),
                columns.join(", "),
                placeholders.join(", ")
            ),
            parameters.as_slice(),
        )?;

        Ok(())
    }

    fn update_record(
        &self,
        namespace: &str,
        class: &str,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), StoreError> {
        let namespace = canonical_namespace(namespace)?;
        let catalog = self.require_class(&namespace, class)?;
        catalog.validate_values(class, values)?;
        let key_field = catalog.key_field()?;

        let not_found = || StoreError::RecordNotFound {
            class: class.to_string(),
            key: key.to_string(),
        };

        if values.is_empty() {
            return match self.find_record(&namespace, class, key)? {
                Some(_) => Ok(()),
                None => Err(not_found()),
            };
        }

        let assignments: Vec<String> = values
            .keys()
            .enumerate()
            .map(|(index, name)| format!("{} = ?{}", quote(name), index + 1))
            .collect();

        let mut parameters: Vec<&dyn ToSql> =
            values.values().map(|value| value as &dyn ToSql).collect();
        parameters.push(&key);

        let updated = self.connection.execute(
            &format!(
                "UPDATE {} SET {} WHERE {} = ?{}",
                quote(&catalog.table_name),
                assignments.join(", "),
                quote(&key_field.name),
                parameters.len()
            ),
            parameters.as_slice(),
        )?;

        if updated == 0 {
            return Err(not_found());
        }

        Ok(())
    }
}

fn read_values(row: &Row<'_>, offset: usize, fields: &[&FieldSpec]) -> rusqlite::Result<FieldValues> {
    let mut values = FieldValues::new();

    for (index, field) in fields.iter().enumerate() {
        let column = offset + index;
        let value = match field.kind {
            FieldKind::String => row
                .get::<_, Option<String>>(column)?
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Null),
            FieldKind::UInt32 => match row.get::<_, Option<i64>>(column)? {
                Some(raw) => u32::try_from(raw)
                    .map(FieldValue::UInt32)
                    .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(column, raw))?,
                None => FieldValue::Null,
            },
        };
        values.insert(field.name.to_string(), value);
    }

    Ok(values)
}

fn column_definition(field: &FieldSpec) -> String {
    let name = quote(&field.name);
    let mut definition = match field.kind {
        FieldKind::String => format!("{name} TEXT"),
        FieldKind::UInt32 => format!("{name} INTEGER CHECK ({name} BETWEEN 0 AND 4294967295)"),
    };

    if field.is_key {
        definition.push_str(" COLLATE NOCASE PRIMARY KEY NOT NULL");
    } else if !field.nullable {
        definition.push_str(" NOT NULL");
    }

    definition
}

fn canonical_namespace(namespace: &str) -> Result<String, StoreError> {
    normalize_namespace(namespace).ok_or_else(|| StoreError::InvalidIdentifier(namespace.to_string()))
}

fn ensure_identifier(name: &str) -> Result<(), StoreError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

// Identifiers are validated before they reach SQL text.
fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
