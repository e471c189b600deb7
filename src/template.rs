//! Named message templates rendered with Handlebars.
//!
//! A [`TemplateRenderer`] answers two questions for a template name: which
//! fields does it need, and what does it look like with these values filled
//! in. [`HandlebarsRenderer`] is the provided implementation.
//!
//! # Example
//!
//! ```
//! use bulletin::{HandlebarsRenderer, TemplateRenderer};
//! use std::collections::BTreeMap;
//!
//! let mut renderer = HandlebarsRenderer::new();
//! renderer
//!     .register_template("attendance_alert", "<p>Dear {{name}}, your attendance in {{department}} is low.</p>")
//!     .unwrap();
//!
//! let keys = renderer.required_variables("attendance_alert").unwrap();
//! assert!(keys.contains("name") && keys.contains("department"));
//!
//! let mut vars = BTreeMap::new();
//! vars.insert("name".to_string(), "Asha".to_string());
//! let body = renderer.render("attendance_alert", &vars).unwrap();
//! assert_eq!(body, "<p>Dear Asha, your attendance in  is low.</p>");
//! ```

use handlebars::Handlebars;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;

use crate::error::DispatchError;

/// Field names every student template could rely on before templates
/// declared their own keys.
pub const DEFAULT_TEMPLATE_KEYS: [&str; 4] = ["regNo", "name", "email", "department"];

/// File extension picked up by [`HandlebarsRenderer::load_directory`].
pub const TEMPLATE_EXTENSION: &str = "hbs";

/// Renders named templates.
pub trait TemplateRenderer: Send + Sync {
    /// Field names the template reads.
    ///
    /// Fails with [`DispatchError::TemplateNotFound`] for an unknown name.
    fn required_variables(&self, template_id: &str) -> Result<BTreeSet<String>, DispatchError>;

    /// Render the template with `variables`.
    ///
    /// Variables the template references but the map lacks render as empty
    /// strings. Fails with [`DispatchError::TemplateNotFound`] for an unknown name.
    fn render(
        &self,
        template_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, DispatchError>;
}

/// Handlebars-backed renderer.
///
/// Supports everything Handlebars does (`{{#if}}`, `{{#each}}`, HTML
/// escaping, `{{{raw}}}`). Required variables are extracted from the
/// template source when it is registered.
pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
    variables: HashMap<String, BTreeSet<String>>,
    fixed_keys: Option<BTreeSet<String>>,
}

impl HandlebarsRenderer {
    pub fn new() -> Self {
        Self {
            handlebars: Handlebars::new(),
            variables: HashMap::new(),
            fixed_keys: None,
        }
    }

    /// Report the same key set for every template instead of extracting.
    ///
    /// `with_fixed_keys(DEFAULT_TEMPLATE_KEYS)` reproduces the original
    /// student-record behavior.
    pub fn with_fixed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fixed_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Compile and register a template under `name`, replacing any existing one.
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<(), DispatchError> {
        self.handlebars.register_template_string(name, source)?;
        self.variables
            .insert(name.to_string(), extract_variables(source));
        tracing::debug!(template = name, "Template registered");
        Ok(())
    }

    /// Override the extracted variable set for `name`.
    pub fn declare_variables<I, S>(&mut self, name: &str, keys: I) -> Result<(), DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self
            .variables
            .get_mut(name)
            .ok_or_else(|| DispatchError::TemplateNotFound(name.to_string()))?;
        *slot = keys.into_iter().map(Into::into).collect();
        Ok(())
    }

    /// Register every `*.hbs` file in `dir`, named by file stem.
    ///
    /// Returns the number of templates registered.
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize, DispatchError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            DispatchError::Configuration(format!("template directory {}: {}", dir.display(), e))
        })?;

        let mut count = 0;
        for entry in entries {
            let path = entry
                .map_err(|e| DispatchError::Configuration(e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path).map_err(|e| {
                DispatchError::Template(format!("{}: {}", path.display(), e))
            })?;
            self.register_template(name, &source)?;
            count += 1;
        }

        tracing::info!(dir = %dir.display(), count, "Templates loaded");
        Ok(count)
    }

    /// Check if a template is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    /// Registered template names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for HandlebarsRenderer {
    fn required_variables(&self, template_id: &str) -> Result<BTreeSet<String>, DispatchError> {
        let extracted = self
            .variables
            .get(template_id)
            .ok_or_else(|| DispatchError::TemplateNotFound(template_id.to_string()))?;
        Ok(self.fixed_keys.clone().unwrap_or_else(|| extracted.clone()))
    }

    fn render(
        &self,
        template_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<String, DispatchError> {
        if !self.has_template(template_id) {
            return Err(DispatchError::TemplateNotFound(template_id.to_string()));
        }
        Ok(self.handlebars.render(template_id, variables)?)
    }
}

fn mustache_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\{?~?\s*([^{}]*?)\s*~?\}?\}\}").expect("static regex is valid")
    })
}

/// Top-level field names referenced by a Handlebars source.
///
/// Picks up `{{name}}`, `{{{name}}}`, `{{user.name}}` (as `user`), helper
/// and block arguments (`{{#if late}}` yields `late`), and hash values.
/// Skips comments, partials, closing tags, `else`, `this`, `@data`,
/// parent paths and literals. Lookups inside `each` and `with` bodies
/// resolve against the block's context, so only the block argument counts.
pub fn extract_variables(source: &str) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    let mut blocks: Vec<&str> = Vec::new();

    for caps in mustache_regex().captures_iter(source) {
        let expr = caps.get(1).map_or("", |m| m.as_str()).trim();
        if expr.is_empty() || expr.starts_with(['!', '>']) {
            continue;
        }
        if let Some(closing) = expr.strip_prefix('/') {
            if let Some(pos) = blocks.iter().rposition(|b| *b == closing.trim()) {
                blocks.truncate(pos);
            }
            continue;
        }

        let scoped = blocks.iter().any(|b| matches!(*b, "each" | "with"));
        let mut tokens = expr.split_whitespace();
        let first = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        // `{{name}}` is a lookup, `{{helper a b}}` and `{{#block a}}` take arguments.
        let candidates: Vec<&str> = if let Some(block) = first.strip_prefix(['#', '^']) {
            if block.is_empty() {
                continue;
            }
            blocks.push(block);
            args
        } else if first == "else" {
            // `{{else if cond}}` chains evaluate `cond` in the enclosing context
            args.into_iter().skip(1).collect()
        } else if !args.is_empty() {
            args
        } else {
            vec![first]
        };

        if scoped {
            continue;
        }
        for token in candidates {
            let token = token.rsplit_once('=').map_or(token, |(_, value)| value);
            if let Some(name) = field_name(token) {
                vars.insert(name.to_string());
            }
        }
    }

    vars
}

fn field_name(token: &str) -> Option<&str> {
    let head = token
        .split(['.', '/', '['])
        .next()
        .unwrap_or_default();
    let valid = head
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && head.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid || matches!(head, "this" | "true" | "false" | "null" | "undefined" | "else") {
        return None;
    }
    Some(head)
}
