use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Sentinel inside a sub-question meaning "replan now" rather than "research this".
pub const RETHINK_MARKER: &str = "<|RETHINK AND PLANNING>|";

/// Display-only ordinal of a plan step; models emit both `"1"` and `1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepId {
    Int(i64),
    Text(String),
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::Int(n) => write!(f, "{n}"),
            StepId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step: StepId,
    pub sub_question: String,
}

impl Step {
    pub fn new(step: StepId, sub_question: impl Into<String>) -> Self {
        Self {
            step,
            sub_question: sub_question.into(),
        }
    }

    pub fn is_rethink(&self) -> bool {
        self.sub_question.contains(RETHINK_MARKER)
    }
}

/// Ordered TODO list. Replaced wholesale on every replan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn has_rethink(&self) -> bool {
        self.steps.iter().any(Step::is_rethink)
    }
}

/// One extracted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Reference", 3)?;
        s.serialize_field("url", &self.url)?;
        // Title and content travel together, as they are shown to the summarizer.
        s.serialize_field("content", &format!("{}\n{}", self.title, self.content))?;
        s.serialize_field("title", &self.title)?;
        s.end()
    }
}

/// Labelled sources for one summarization call: `"Reference 0"`, `"Reference 1"`, ...
///
/// Labels are positional, so merging maps relabels sequentially.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    entries: Vec<Reference>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(idx: usize) -> String {
        format!("Reference {idx}")
    }

    pub fn push(&mut self, r: Reference) {
        self.entries.push(r);
    }

    pub fn extend(&mut self, other: ReferenceMap) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Reference> {
        let idx: usize = label.strip_prefix("Reference ")?.parse().ok()?;
        self.entries.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (String, &Reference)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, r)| (Self::label(i), r))
    }

    pub fn references(&self) -> &[Reference] {
        &self.entries
    }
}

impl Serialize for ReferenceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, r) in self.iter() {
            m.serialize_entry(&label, r)?;
        }
        m.end()
    }
}

/// Accumulated sub_question -> summary map.
///
/// Insertion-ordered; re-inserting a key replaces its summary in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResearchState {
    entries: Vec<(String, String)>,
}

impl ResearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sub_question: impl Into<String>, summary: impl Into<String>) {
        let key = sub_question.into();
        let summary = summary.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = summary,
            None => self.entries.push((key, summary)),
        }
    }

    pub fn get(&self, sub_question: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == sub_question)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, sub_question: &str) -> bool {
        self.get(sub_question).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compact JSON object, used wherever a prompt embeds the state.
    pub fn to_prompt_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

impl Serialize for ResearchState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            m.serialize_entry(k, v)?;
        }
        m.end()
    }
}
