//! Cheap substring screening of files against changed dependencies
//!
//! Pattern generation is a pure function of (name, kind). Screening is
//! verbatim substring containment only — no regex, no tokenization. The
//! gate is deliberately high-recall/low-precision: a false positive costs
//! one extra assessor call, a false negative loses an impact.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What kind of symbol a changed dependency is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Function,
    Class,
    Variable,
    Method,
    Import,
    Decorator,
    Route,
    Other,
}

impl FromStr for DependencyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "function" => Ok(Self::Function),
            "class" => Ok(Self::Class),
            "variable" => Ok(Self::Variable),
            "method" => Ok(Self::Method),
            "import" => Ok(Self::Import),
            "decorator" => Ok(Self::Decorator),
            "route" => Ok(Self::Route),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown dependency kind: {other}")),
        }
    }
}

/// What happened to the dependency in the source change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyAction {
    Added,
    Modified,
    Removed,
}

impl FromStr for DependencyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "removed" => Ok(Self::Removed),
            other => Err(format!("unknown dependency action: {other}")),
        }
    }
}

/// A named symbol changed by the source patch, as reported by the patch
/// analyzer. Consumed read-only by screening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyKind,
    pub action: DependencyAction,
    /// Whether the patch analyzer flagged the change as breaking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking: Option<bool>,
}

impl FromStr for Dependency {
    type Err = String;

    /// Parse `name:kind[:action]` as used on the CLI, e.g.
    /// `UserService:class:modified`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(format!("dependency spec has empty name: {s:?}"));
        }
        let kind = match parts.next() {
            Some(k) => k.parse()?,
            None => return Err(format!("dependency spec missing kind: {s:?}")),
        };
        let action = match parts.next() {
            Some(a) => a.parse()?,
            None => DependencyAction::Modified,
        };
        Ok(Dependency {
            name: name.to_string(),
            kind,
            action,
            breaking: None,
        })
    }
}

/// Generate the ordered literal-substring evidence set for a dependency.
///
/// Deterministic and network-free. The base set covers bare references,
/// quoted references, calls, member access, and assignment; kind-specific
/// patterns add the spellings each kind tends to appear under.
pub fn build_patterns(dep: &Dependency) -> Vec<String> {
    let name = dep.name.as_str();
    let mut patterns = vec![
        name.to_string(),
        format!("\"{name}\""),
        format!("'{name}'"),
        format!("{name}("),
        format!("{name}."),
        format!("= {name}"),
    ];

    match dep.kind {
        DependencyKind::Route if name.contains('/') => {
            // Route names look like "GET /users/:id" — match on the path
            // portion too, since handlers and clients rarely spell the verb.
            let route_path = name.rsplit(' ').next().unwrap_or(name);
            patterns.push(route_path.to_string());
            patterns.push(format!("\"{route_path}\""));
            patterns.push(format!("'{route_path}'"));
        }
        DependencyKind::Function => {
            patterns.push(format!("@{name}"));
            patterns.push(format!("def {name}"));
            patterns.push(format!("function {name}"));
            patterns.push(format!("{name} =>"));
        }
        DependencyKind::Class => {
            patterns.push(format!("class {name}"));
            patterns.push(format!("new {name}"));
            patterns.push(format!("extends {name}"));
        }
        _ => {}
    }

    patterns
}

/// A set of dependencies with their patterns precomputed, ready to screen
/// many file contents.
pub struct ScreenSet {
    entries: Vec<(Dependency, Vec<String>)>,
}

impl ScreenSet {
    pub fn new(dependencies: &[Dependency]) -> Self {
        let entries = dependencies
            .iter()
            .filter(|d| !d.name.is_empty())
            .map(|d| (d.clone(), build_patterns(d)))
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shortlist the dependencies whose patterns occur verbatim in
    /// `content`. A dependency matches iff any one pattern is a substring.
    pub fn screen<'a>(&'a self, content: &str) -> Vec<&'a Dependency> {
        self.entries
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| content.contains(p.as_str())))
            .map(|(dep, _)| dep)
            .collect()
    }
}
