//! Template use-case service.
//!
//! # Responsibility
//! - Save, list, load and delete parameter templates.
//! - Install readonly presets.
//!
//! # Invariants
//! - Presets are never deleted or overwritten by a user save.
//! - Saving under an existing slug owned by a different name allocates the
//!   next free `<slug>_<n>` id (n starting at 2); the same name overwrites.

use crate::model::template::{slugify, Template};
use crate::repo::template_repo::{TemplateRepoError, TemplateRepository};
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum TemplateServiceError {
    BlankName,
    NotFound(String),
    /// Presets cannot be deleted.
    Readonly(String),
    Repo(TemplateRepoError),
}

impl Display for TemplateServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "template name is required"),
            Self::NotFound(id) => write!(f, "template not found: {id}"),
            Self::Readonly(id) => write!(f, "template `{id}` is a readonly preset"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TemplateServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateRepoError> for TemplateServiceError {
    fn from(value: TemplateRepoError) -> Self {
        match value {
            TemplateRepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

pub type TemplateServiceResult<T> = Result<T, TemplateServiceError>;

/// `PUSH_TEMPLATES` content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateList {
    pub presets: Vec<Template>,
    pub user_templates: Vec<Template>,
}

/// Template service facade over repository implementations.
pub struct TemplateService<R: TemplateRepository> {
    repo: R,
}

impl<R: TemplateRepository> TemplateService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn list(&self) -> TemplateServiceResult<TemplateList> {
        Ok(TemplateList {
            presets: self.repo.list_templates(true)?,
            user_templates: self.repo.list_templates(false)?,
        })
    }

    /// Saves a user template and returns it as persisted.
    pub fn save(
        &self,
        name: &str,
        description: &str,
        schema_version: &str,
        parameters: BTreeMap<String, String>,
    ) -> TemplateServiceResult<Template> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TemplateServiceError::BlankName);
        }

        let id = self.allocate_id(name)?;
        let template = Template {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: String::new(),
            schema_version: schema_version.to_string(),
            readonly: false,
            parameters,
        };
        self.repo.upsert_template(&template)?;
        info!(
            "event=template_save module=templates status=ok id={} params={}",
            id,
            template.parameters.len()
        );

        self.repo
            .get_template(&id)?
            .ok_or(TemplateServiceError::NotFound(id))
    }

    /// Loads from the preset (`readonly`) or user namespace.
    pub fn load(&self, id: &str, readonly: bool) -> TemplateServiceResult<Template> {
        match self.repo.get_template(id)? {
            Some(template) if template.readonly == readonly => Ok(template),
            _ => Err(TemplateServiceError::NotFound(id.to_string())),
        }
    }

    pub fn delete(&self, id: &str) -> TemplateServiceResult<()> {
        let template = self
            .repo
            .get_template(id)?
            .ok_or_else(|| TemplateServiceError::NotFound(id.to_string()))?;
        if template.readonly {
            return Err(TemplateServiceError::Readonly(id.to_string()));
        }
        self.repo.delete_template(id)?;
        info!("event=template_delete module=templates status=ok id={}", id);
        Ok(())
    }

    /// Installs or refreshes readonly presets; returns how many were written.
    pub fn seed_presets(&self, presets: &[Template]) -> TemplateServiceResult<usize> {
        for preset in presets {
            let mut preset = preset.clone();
            preset.readonly = true;
            self.repo.upsert_template(&preset)?;
        }
        info!(
            "event=template_seed module=templates status=ok presets={}",
            presets.len()
        );
        Ok(presets.len())
    }

    fn allocate_id(&self, name: &str) -> TemplateServiceResult<String> {
        let slug = slugify(name);
        match self.repo.get_template(&slug)? {
            None => return Ok(slug),
            Some(existing) if !existing.readonly && existing.name == name => return Ok(slug),
            Some(_) => {}
        }

        let mut counter = 2usize;
        loop {
            let candidate = format!("{slug}_{counter}");
            match self.repo.get_template(&candidate)? {
                None => return Ok(candidate),
                Some(existing) if !existing.readonly && existing.name == name => {
                    return Ok(candidate)
                }
                Some(_) => counter += 1,
            }
        }
    }
}
