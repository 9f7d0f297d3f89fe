//! Filesystem-safe names for projects, subjects and sessions.
//!
//! Resolution is a pure function of (label, kind). Collision handling lives in
//! [`LabelScope`], one scope per parent container.

use std::collections::HashSet;

use crate::errors::GearError;

/// Container levels that carry a resolvable label.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LabelKind {
    Project,
    Subject,
    Session,
}

impl LabelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Project => "project",
            LabelKind::Subject => "subject",
            LabelKind::Session => "session",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Some(LabelKind::Project),
            "subject" | "sub" => Some(LabelKind::Subject),
            "session" | "ses" => Some(LabelKind::Session),
            _ => None,
        }
    }
}

/// Sanitize a raw container label for use as a directory / BIDS entity.
pub fn resolve_label(raw: &str, kind: LabelKind) -> String {
    match kind {
        LabelKind::Subject => raw.chars().filter(|c| !matches!(c, '-' | ' ' | '_')).collect(),
        LabelKind::Session => raw
            .split_whitespace()
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .collect(),
        LabelKind::Project => raw.replace('-', "_").replace(' ', ""),
    }
}

/// Labels already handed out under one parent container.
#[derive(Debug, Default, Clone)]
pub struct LabelScope {
    assigned: HashSet<String>,
}

impl LabelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `base`, or the first free `base` + 'a'..='z' when it is taken.
    ///
    /// Fails once all 26 suffixes are in use under this scope.
    pub fn claim(&mut self, base: &str) -> Result<String, GearError> {
        if self.assigned.insert(base.to_string()) {
            return Ok(base.to_string());
        }
        for suffix in 'a'..='z' {
            let candidate = format!("{base}{suffix}");
            if self.assigned.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
        Err(GearError::config(format!(
            "label '{base}' is used by more than 27 containers under one parent; no suffix left"
        )))
    }

    /// Resolve and claim in one step. A label that resolves to nothing is
    /// rejected, since it would name the parent's own folder.
    pub fn resolve(&mut self, raw: &str, kind: LabelKind) -> Result<String, GearError> {
        let base = resolve_label(raw, kind);
        if base.is_empty() {
            return Err(GearError::config(format!(
                "{} label {raw:?} resolves to an empty name",
                kind.as_str()
            )));
        }
        self.claim(&base)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.assigned.contains(label)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
