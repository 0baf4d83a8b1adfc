//! Note templates.
//!
//! # Responsibility
//! - Ship the built-in templates and merge them with custom ones.
//! - Validate custom template CRUD and render placeholders.
//!
//! # Invariants
//! - Built-in ids are reserved: custom templates can neither reuse,
//!   update nor delete them.
//! - `list` returns built-ins first, in shipping order, then custom
//!   templates ordered by name.
//! - Placeholders are `{{date}}`, `{{time}}`, `{{day_of_week}}` and
//!   `{{title}}`. Unknown placeholders are left untouched.

use crate::daily::date_key;
use crate::model::template::{generate_template_id, Template, TemplateInput};
use crate::store::{StoreError, TemplateStore};
use chrono::{Local, NaiveDate, NaiveDateTime};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

struct BuiltIn {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    content: &'static str,
}

const BUILT_INS: &[BuiltIn] = &[
    BuiltIn {
        id: "meeting-notes",
        name: "Meeting Notes",
        description: "Structured template for meeting documentation",
        icon: "users",
        content: include_str!("defaults/meeting-notes.md"),
    },
    BuiltIn {
        id: "daily-log",
        name: "Daily Log",
        description: "Track your daily goals, accomplishments, and reflections",
        icon: "calendar",
        content: include_str!("defaults/daily-log.md"),
    },
    BuiltIn {
        id: "project-plan",
        name: "Project Plan",
        description: "Plan and track project goals, timeline, and resources",
        icon: "clipboard",
        content: include_str!("defaults/project-plan.md"),
    },
];

impl BuiltIn {
    fn to_template(&self) -> Template {
        Template {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            icon: self.icon.to_string(),
            is_default: true,
            content: self.content.to_string(),
        }
    }
}

/// Templates shipped with the engine.
pub fn default_templates() -> Vec<Template> {
    BUILT_INS.iter().map(BuiltIn::to_template).collect()
}

fn built_in(id: &str) -> Option<&'static BuiltIn> {
    BUILT_INS.iter().find(|template| template.id == id)
}

/// Values substituted into template placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub at: NaiveDateTime,
    pub title: String,
}

impl TemplateVars {
    pub fn new(at: NaiveDateTime, title: impl Into<String>) -> Self {
        Self {
            at,
            title: title.into(),
        }
    }

    /// Current local time.
    pub fn now(title: impl Into<String>) -> Self {
        Self::new(Local::now().naive_local(), title)
    }

    /// `date` at the current local time of day.
    pub fn on(date: NaiveDate, title: impl Into<String>) -> Self {
        Self::new(date.and_time(Local::now().naive_local().time()), title)
    }

    pub fn render(&self, content: &str) -> String {
        content
            .replace("{{date}}", &date_key(self.at.date()))
            .replace("{{time}}", &self.at.format("%H:%M").to_string())
            .replace("{{day_of_week}}", &self.at.format("%A").to_string())
            .replace("{{title}}", &self.title)
    }
}

#[derive(Debug)]
pub enum TemplateError {
    NotFound(String),
    /// Name has no characters usable in an id.
    InvalidName(String),
    /// A template with the derived id already exists.
    AlreadyExists(String),
    /// Built-in templates cannot be changed.
    ReadOnly(String),
    Store(StoreError),
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "template `{id}` not found"),
            Self::InvalidName(name) => write!(f, "invalid template name `{name}`"),
            Self::AlreadyExists(name) => {
                write!(f, "a template with the name `{name}` already exists")
            }
            Self::ReadOnly(id) => write!(f, "built-in template `{id}` cannot be modified"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TemplateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for TemplateError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Built-in plus custom templates over a `TemplateStore`.
#[derive(Clone)]
pub struct TemplateLibrary {
    store: Arc<dyn TemplateStore>,
}

impl TemplateLibrary {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> TemplateResult<Vec<Template>> {
        let mut templates = default_templates();
        templates.extend(self.store.list_templates()?);
        Ok(templates)
    }

    pub fn get(&self, id: &str) -> TemplateResult<Template> {
        if let Some(template) = built_in(id) {
            return Ok(template.to_template());
        }
        self.store
            .get_template(id)?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// Stores a new custom template under an id derived from its name.
    pub fn save(&self, input: TemplateInput) -> TemplateResult<Template> {
        let id = generate_template_id(&input.name);
        if id.is_empty() {
            return Err(TemplateError::InvalidName(input.name));
        }
        if built_in(&id).is_some() {
            return Err(TemplateError::ReadOnly(id));
        }

        let name = input.name.clone();
        let template = input.into_template(id);
        match self.store.insert_template(&template) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(TemplateError::AlreadyExists(name)),
            Err(err) => return Err(err.into()),
        }
        info!(
            "event=template_save module=template status=ok template_id={}",
            template.id
        );
        Ok(template)
    }

    /// Replaces a custom template. The id stays fixed even if the name
    /// changes.
    pub fn update(&self, id: &str, input: TemplateInput) -> TemplateResult<Template> {
        if built_in(id).is_some() {
            return Err(TemplateError::ReadOnly(id.to_string()));
        }
        let template = input.into_template(id.to_string());
        if !self.store.replace_template(&template)? {
            return Err(TemplateError::NotFound(id.to_string()));
        }
        Ok(template)
    }

    /// Deletes a custom template. Deleting an unknown id succeeds.
    pub fn delete(&self, id: &str) -> TemplateResult<()> {
        if built_in(id).is_some() {
            return Err(TemplateError::ReadOnly(id.to_string()));
        }
        self.store.delete_template(id)?;
        info!(
            "event=template_delete module=template status=ok template_id={}",
            id
        );
        Ok(())
    }

    /// Rendered content of a template.
    pub fn apply(&self, id: &str, vars: &TemplateVars) -> TemplateResult<String> {
        Ok(vars.render(&self.get(id)?.content))
    }
}
