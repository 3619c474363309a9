//! Workflow definitions: entity types, their statuses, and the transition
//! rule table.
//!
//! A [`WorkflowDefinition`] is the serialized form (JSON or TOML). It becomes
//! a [`Workflow`] only after [`Workflow::from_definition`] has checked every
//! structural invariant and built the rule index used at request time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::predicate::Predicate;

/// Wildcard accepted in a rule's `from` field.
pub const ANY_STATUS: &str = "*";

/// One entity type and its finite status set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityType {
    pub name: String,
    pub statuses: Vec<String>,
    /// Status assigned by `create`.
    pub initial: String,
    /// Statuses that block every transition not marked `allowFromTerminal`.
    #[serde(default)]
    pub terminal: Vec<String>,
}

impl EntityType {
    pub fn has_status(&self, status: &str) -> bool {
        self.statuses.iter().any(|s| s == status)
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.terminal.iter().any(|s| s == status)
    }
}

/// Source status of a rule: one status or any status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FromStatus {
    Any,
    Status(String),
}

impl From<String> for FromStatus {
    fn from(s: String) -> Self {
        if s == ANY_STATUS {
            FromStatus::Any
        } else {
            FromStatus::Status(s)
        }
    }
}

impl From<FromStatus> for String {
    fn from(f: FromStatus) -> Self {
        match f {
            FromStatus::Any => ANY_STATUS.to_string(),
            FromStatus::Status(s) => s,
        }
    }
}

impl fmt::Display for FromStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FromStatus::Any => f.write_str(ANY_STATUS),
            FromStatus::Status(s) => f.write_str(s),
        }
    }
}

/// `(entity_type, from, action) -> to` with the conditions that guard it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRule {
    pub entity_type: String,
    pub from: FromStatus,
    pub action: String,
    pub to: String,
    /// Payload fields that must be present and non-empty.
    #[serde(default)]
    pub required_fields: Vec<String>,
    pub allowed_roles: BTreeSet<String>,
    /// Whitelists this rule out of terminal statuses (e.g. reopening).
    #[serde(default)]
    pub allow_from_terminal: bool,
    #[serde(default)]
    pub preconditions: Vec<Predicate>,
    /// Numeric payload counters the engine adds one to when the rule fires.
    /// A missing counter starts at zero.
    #[serde(default)]
    pub increments: Vec<String>,
    /// Tags handed to the notifier after commit (`notify`, `recalculate-balance`, ...).
    #[serde(default)]
    pub side_effects: Vec<String>,
}

impl TransitionRule {
    /// Fields a request's `fieldUpdates` may not set: everything a
    /// precondition reads and every engine-owned counter.
    pub fn guarded_fields(&self) -> BTreeSet<&str> {
        self.preconditions
            .iter()
            .flat_map(|p| p.fields())
            .chain(self.increments.iter().map(String::as_str))
            .collect()
    }
}

/// Serialized workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub entity_types: Vec<EntityType>,
    #[serde(default)]
    pub rules: Vec<TransitionRule>,
}

/// Errors produced while loading a workflow definition.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("cannot read workflow file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse workflow definition: {0}")]
    Parse(String),

    #[error("invalid workflow definition:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

type RuleKey = (String, FromStatus, String);

/// A validated, indexed workflow. Read-only at request time.
#[derive(Debug, Clone)]
pub struct Workflow {
    definition: WorkflowDefinition,
    type_index: HashMap<String, usize>,
    rule_index: HashMap<RuleKey, usize>,
}

impl Workflow {
    /// Validate a definition and build its indexes.
    ///
    /// All problems are collected and reported together.
    pub fn from_definition(definition: WorkflowDefinition) -> Result<Self, DefinitionError> {
        let mut errors = Vec::new();
        let mut type_index = HashMap::new();

        for (i, t) in definition.entity_types.iter().enumerate() {
            if t.name.trim().is_empty() {
                errors.push(format!("entity type #{} has an empty name", i + 1));
            }
            if type_index.insert(t.name.clone(), i).is_some() {
                errors.push(format!("entity type '{}' declared more than once", t.name));
            }
            if t.statuses.is_empty() {
                errors.push(format!("entity type '{}' declares no statuses", t.name));
            }
            let mut seen = HashSet::new();
            for s in &t.statuses {
                if s == ANY_STATUS || s.trim().is_empty() {
                    errors.push(format!("entity type '{}' has invalid status '{}'", t.name, s));
                }
                if !seen.insert(s.as_str()) {
                    errors.push(format!("entity type '{}' repeats status '{}'", t.name, s));
                }
            }
            if !t.has_status(&t.initial) {
                errors.push(format!(
                    "entity type '{}' initial status '{}' is not declared",
                    t.name, t.initial
                ));
            }
            for s in &t.terminal {
                if !t.has_status(s) {
                    errors.push(format!(
                        "entity type '{}' terminal status '{}' is not declared",
                        t.name, s
                    ));
                }
            }
        }

        let mut rule_index = HashMap::new();
        for (i, r) in definition.rules.iter().enumerate() {
            let label = format!("rule '{}' ({} {} -> {})", r.action, r.entity_type, r.from, r.to);
            let Some(&ti) = type_index.get(&r.entity_type) else {
                errors.push(format!("{}: unknown entity type", label));
                continue;
            };
            let t = &definition.entity_types[ti];
            if r.action.trim().is_empty() {
                errors.push(format!("{}: empty action name", label));
            }
            if let FromStatus::Status(s) = &r.from {
                if !t.has_status(s) {
                    errors.push(format!("{}: from status '{}' is not declared", label, s));
                }
            }
            if !t.has_status(&r.to) {
                errors.push(format!("{}: target status '{}' is not declared", label, r.to));
            }
            if r.allowed_roles.is_empty() {
                errors.push(format!("{}: no allowed roles", label));
            }
            if r.required_fields.iter().any(|f| f.trim().is_empty()) {
                errors.push(format!("{}: empty required field name", label));
            }
            if r
                .preconditions
                .iter()
                .flat_map(|p| p.fields())
                .any(|f| f.trim().is_empty())
            {
                errors.push(format!("{}: precondition references an empty field name", label));
            }
            if r.increments.iter().any(|f| f.trim().is_empty()) {
                errors.push(format!("{}: empty counter field name", label));
            }
            let key = (r.entity_type.clone(), r.from.clone(), r.action.clone());
            if rule_index.insert(key, i).is_some() {
                errors.push(format!(
                    "{}: duplicate rule for ({}, {}, {})",
                    label, r.entity_type, r.from, r.action
                ));
            }
        }

        // A wildcard rule may not share its action with an exact-status rule;
        // every (type, status, action) resolves to at most one rule.
        for r in definition.rules.iter().filter(|r| r.from == FromStatus::Any) {
            for other in definition.rules.iter() {
                if let FromStatus::Status(s) = &other.from {
                    if other.entity_type == r.entity_type && other.action == r.action {
                        errors.push(format!(
                            "rule '{}' ({} * -> {}): overlaps the rule from status '{}'",
                            r.action, r.entity_type, r.to, s
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(Workflow {
                definition,
                type_index,
                rule_index,
            })
        } else {
            Err(DefinitionError::Invalid(errors))
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, DefinitionError> {
        let def: WorkflowDefinition =
            serde_json::from_str(s).map_err(|e| DefinitionError::Parse(e.to_string()))?;
        Self::from_definition(def)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, DefinitionError> {
        let def: WorkflowDefinition =
            toml::from_str(s).map_err(|e| DefinitionError::Parse(e.to_string()))?;
        Self::from_definition(def)
    }

    /// Load a definition file; `.toml` files are parsed as TOML, anything
    /// else as JSON.
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let text = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn name(&self) -> Option<&str> {
        self.definition.name.as_deref()
    }

    pub fn entity_types(&self) -> &[EntityType] {
        &self.definition.entity_types
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.type_index
            .get(name)
            .map(|&i| &self.definition.entity_types[i])
    }

    /// All rules declared for an entity type, in declaration order.
    pub fn rules_for<'a>(&'a self, entity_type: &'a str) -> impl Iterator<Item = &'a TransitionRule> {
        self.definition
            .rules
            .iter()
            .filter(move |r| r.entity_type == entity_type)
    }

    /// The rule matching `(entity_type, status, action)`. Validation keeps
    /// exact and wildcard rules for one action disjoint, so at most one
    /// lookup hits.
    pub fn find_rule(&self, entity_type: &str, status: &str, action: &str) -> Option<&TransitionRule> {
        let exact = (
            entity_type.to_string(),
            FromStatus::Status(status.to_string()),
            action.to_string(),
        );
        let wildcard = (entity_type.to_string(), FromStatus::Any, action.to_string());
        self.rule_index
            .get(&exact)
            .or_else(|| self.rule_index.get(&wildcard))
            .map(|&i| &self.definition.rules[i])
    }

    /// Rules that could fire from `status`, one per action.
    pub fn rules_from(&self, entity_type: &str, status: &str) -> Vec<&TransitionRule> {
        let mut actions: Vec<&str> = Vec::new();
        for r in self.rules_for(entity_type) {
            let applies = match &r.from {
                FromStatus::Any => true,
                FromStatus::Status(s) => s == status,
            };
            if applies && !actions.contains(&r.action.as_str()) {
                actions.push(r.action.as_str());
            }
        }
        actions
            .into_iter()
            .filter_map(|a| self.find_rule(entity_type, status, a))
            .collect()
    }
}
