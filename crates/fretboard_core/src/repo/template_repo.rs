//! Template repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist readonly presets and user templates with their parameter maps.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `Template::validate()` before SQL mutations.
//! - A template's parameter set is replaced atomically on upsert.
//! - Listing is deterministic: `id ASC`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::template::{Template, TemplateValidationError};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TemplateRepoResult<T> = Result<T, TemplateRepoError>;

/// Errors from template persistence.
#[derive(Debug)]
pub enum TemplateRepoError {
    Validation(TemplateValidationError),
    Db(DbError),
    NotFound(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted to a valid template.
    InvalidData(String),
}

impl Display for TemplateRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "template not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "template repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted template data: {message}"),
        }
    }
}

impl Error for TemplateRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateValidationError> for TemplateRepoError {
    fn from(value: TemplateValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for TemplateRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TemplateRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for template storage.
pub trait TemplateRepository {
    /// Lists presets (`readonly = true`) or user templates.
    fn list_templates(&self, readonly: bool) -> TemplateRepoResult<Vec<Template>>;
    fn get_template(&self, id: &str) -> TemplateRepoResult<Option<Template>>;
    /// Inserts or fully replaces one template.
    fn upsert_template(&self, template: &Template) -> TemplateRepoResult<()>;
    fn delete_template(&self, id: &str) -> TemplateRepoResult<()>;
}

/// SQLite-backed template repository.
pub struct SqliteTemplateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTemplateRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> TemplateRepoResult<Self> {
        let expected_version = latest_version();
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(TemplateRepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn load_parameters(&self, template_id: &str) -> TemplateRepoResult<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, expression
             FROM template_parameters
             WHERE template_id = ?1
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([template_id])?;
        let mut parameters = BTreeMap::new();
        while let Some(row) = rows.next()? {
            parameters.insert(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
        }
        Ok(parameters)
    }
}

impl TemplateRepository for SqliteTemplateRepository<'_> {
    fn list_templates(&self, readonly: bool) -> TemplateRepoResult<Vec<Template>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at, schema_version, readonly
             FROM templates
             WHERE readonly = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([bool_to_int(readonly)])?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next()? {
            templates.push(parse_template_row(row)?);
        }
        drop(rows);

        for template in &mut templates {
            template.parameters = self.load_parameters(&template.id)?;
        }
        Ok(templates)
    }

    fn get_template(&self, id: &str) -> TemplateRepoResult<Option<Template>> {
        let template = self
            .conn
            .query_row(
                "SELECT id, name, description, created_at, schema_version, readonly
                 FROM templates
                 WHERE id = ?1;",
                [id],
                |row| Ok(parse_template_row(row)),
            )
            .optional()?
            .transpose()?;

        match template {
            Some(mut template) => {
                template.parameters = self.load_parameters(&template.id)?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }

    fn upsert_template(&self, template: &Template) -> TemplateRepoResult<()> {
        template.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO templates (id, name, description, created_at, schema_version, readonly)
             VALUES (?1, ?2, ?3, COALESCE(NULLIF(?4, ''), strftime('%Y-%m-%d', 'now')), ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                created_at = excluded.created_at,
                schema_version = excluded.schema_version,
                readonly = excluded.readonly,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                template.id.as_str(),
                template.name.trim(),
                template.description.as_str(),
                template.created_at.as_str(),
                template.schema_version.as_str(),
                bool_to_int(template.readonly),
            ],
        )?;
        tx.execute(
            "DELETE FROM template_parameters WHERE template_id = ?1;",
            [template.id.as_str()],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO template_parameters (template_id, name, expression)
                 VALUES (?1, ?2, ?3);",
            )?;
            for (name, expression) in &template.parameters {
                insert.execute(params![template.id.as_str(), name, expression])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_template(&self, id: &str) -> TemplateRepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM templates WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(TemplateRepoError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn parse_template_row(row: &Row<'_>) -> TemplateRepoResult<Template> {
    let readonly = match row.get::<_, i64>("readonly")? {
        0 => false,
        1 => true,
        other => {
            return Err(TemplateRepoError::InvalidData(format!(
                "invalid readonly value `{other}` in templates.readonly"
            )));
        }
    };

    Ok(Template {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        schema_version: row.get("schema_version")?,
        readonly,
        parameters: BTreeMap::new(),
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
