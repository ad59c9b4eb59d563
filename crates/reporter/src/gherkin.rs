//! BDD tag enrichment
//!
//! Turns feature, rule and scenario tags of the executing scenario into
//! labels and links on the test. Tag grammar:
//!
//! - `@name("value")` with `name` from [`LABEL_NAMES`] becomes a label;
//!   `feature` and `suite` keep a single value, the narrowest scope wins
//! - `@issue("id")`, `@tms("id")`, `@link("name","url")` become links,
//!   issue and tms ids expanded with the configured prefix
//! - anything else becomes a `tag` label without its leading `@`

use allure_bridge_common::{NodeId, ReporterConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::RunState;

pub const LABEL_NAMES: [&str; 18] = [
    "AS_ID",
    "suite",
    "parentSuite",
    "subSuite",
    "epic",
    "feature",
    "story",
    "severity",
    "tag",
    "owner",
    "lead",
    "host",
    "thread",
    "testMethod",
    "testClass",
    "package",
    "framework",
    "language",
];

/// Labels that hold a single value per test
pub const SINGLETON_LABELS: [&str; 2] = ["feature", "suite"];

static LABEL_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"^@({})\("(.*?)"\)$"#, LABEL_NAMES.join("|")))
        .expect("label tag regex")
});

static LINK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^@(issue|tms|link)\("(.*?)"(?:,\s*"(.*?)")?\)$"#)
        .expect("link tag regex")
});

/// Outline scenarios are named `<name> (example #<n>)`, 1-based
static EXAMPLE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(example #(\d+)\)\s*$").expect("example number regex")
});

/// A tagged gherkin element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagScope {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleRow {
    /// Structural id of the row in the parsed document
    #[serde(default)]
    pub id: Option<String>,
    pub cells: Vec<String>,
}

/// An `Examples:` table of a scenario outline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Examples {
    #[serde(default)]
    pub tags: Vec<String>,
    pub header: Vec<String>,
    #[serde(default)]
    pub rows: Vec<ExampleRow>,
}

impl Examples {
    fn cell(&self, row: &ExampleRow, column: &str) -> Option<String> {
        let index = self.header.iter().position(|h| h == column)?;
        row.cells.get(index).filter(|v| !v.is_empty()).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<Examples>,
    /// Id of the example row being executed, when the host knows it
    #[serde(default)]
    pub row_id: Option<String>,
}

impl Scenario {
    pub fn is_outline(&self) -> bool {
        !self.examples.is_empty()
            || self.keyword.contains("Outline")
            || self.keyword.contains("Template")
    }

    /// The example row executed by this scenario run
    fn current_row(&self) -> Option<(&Examples, &ExampleRow)> {
        let mut rows = self
            .examples
            .iter()
            .flat_map(|table| table.rows.iter().map(move |row| (table, row)));
        if let Some(number) = EXAMPLE_NUMBER
            .captures(&self.name)
            .and_then(|c| c[1].parse::<usize>().ok())
        {
            return rows.nth(number.checked_sub(1)?);
        }
        let id = self.row_id.as_deref()?;
        rows.find(|(_, row)| row.id.as_deref() == Some(id))
    }

    /// Scenario tags plus the tags injected for the executing example row
    pub fn effective_tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        if !self.is_outline() {
            return tags;
        }
        if let Some((table, row)) = self.current_row() {
            tags.extend(table.tags.iter().cloned());
            for kind in ["tms", "issue"] {
                if let Some(value) = table.cell(row, kind) {
                    debug!("Example row {} link: {}", kind, value);
                    tags.push(format!("@{}(\"{}\")", kind, value));
                }
            }
        }
        tags
    }
}

/// Read-only view of the executing scenario and its enclosing elements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSnapshot {
    pub feature: TagScope,
    #[serde(default)]
    pub rule: Option<TagScope>,
    pub scenario: Scenario,
}

/// A parsed tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTag {
    Label { name: String, value: String },
    Link { kind: String, name: String, url: String },
    Tag(String),
}

pub fn parse_tag(tag: &str) -> ParsedTag {
    if let Some(c) = LABEL_TAG.captures(tag) {
        return ParsedTag::Label {
            name: c[1].to_string(),
            value: c[2].to_string(),
        };
    }
    if let Some(c) = LINK_TAG.captures(tag) {
        let name = c[2].to_string();
        let url = c.get(3).map_or_else(|| name.clone(), |m| m.as_str().to_string());
        return ParsedTag::Link {
            kind: c[1].to_string(),
            name,
            url,
        };
    }
    ParsedTag::Tag(tag.strip_prefix('@').unwrap_or(tag).to_string())
}

/// Expand a link id with the configured prefix; `*` marks where the id goes
pub fn link_url(config: &ReporterConfig, kind: &str, url: &str) -> String {
    let prefix = match kind {
        "issue" => config.issue_prefix.as_deref(),
        "tms" => config.tms_prefix.as_deref(),
        _ => None,
    };
    match prefix.filter(|p| !p.is_empty()) {
        Some(p) if p.contains('*') => p.replace('*', url),
        Some(p) => format!("{}{}", p, url),
        None => url.to_string(),
    }
}

/// Apply the scenario's tags to a test, broadest scope first
pub fn enrich(state: &mut RunState, test: NodeId, snapshot: &ScenarioSnapshot) {
    debug!("Applying gherkin tags of '{}'", snapshot.scenario.name);
    state.tree.upsert_label(test, "feature", snapshot.feature.name.clone());

    let mut scopes = vec![snapshot.feature.tags.clone()];
    if let Some(rule) = &snapshot.rule {
        scopes.push(rule.tags.clone());
    }
    scopes.push(snapshot.scenario.effective_tags());

    for tag in scopes.iter().flatten() {
        match parse_tag(tag) {
            ParsedTag::Label { name, value } if SINGLETON_LABELS.contains(&name.as_str()) => {
                state.tree.upsert_label(test, &name, value)
            }
            ParsedTag::Label { name, value } => state.tree.add_label(test, name, value),
            ParsedTag::Link { kind, name, url } => {
                let url = link_url(&state.config, &kind, &url);
                state.tree.add_link(test, url, name, Some(&kind));
            }
            ParsedTag::Tag(tag) => state.tree.add_label(test, "tag", tag),
        }
    }
}
