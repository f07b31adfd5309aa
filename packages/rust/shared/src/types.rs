//! Core domain types for Penflow pipeline runs.
//!
//! Serde field names follow the JSON shapes the generation prompts ask the
//! model to produce, so these types double as the wire format.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StageKind
// ---------------------------------------------------------------------------

/// The three stage shapes of a run. Each has its own template and schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Plan,
    Generate,
    Review,
}

impl StageKind {
    /// All stage kinds in pipeline order.
    pub const ALL: [StageKind; 3] = [StageKind::Plan, StageKind::Generate, StageKind::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Generate => "generate",
            Self::Review => "review",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Self::Plan),
            "generate" => Ok(Self::Generate),
            "review" => Ok(Self::Review),
            other => Err(format!("unknown stage `{other}` (expected plan, generate, or review)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One unit of generation work produced by the Plan stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Free-form label such as "introduction"; unique within a plan.
    #[serde(rename = "section_type")]
    pub kind: String,
    /// What the section should cover.
    #[serde(rename = "description")]
    pub goal: String,
    /// Writing style directive for the section.
    #[serde(rename = "style_guide")]
    pub style: String,
    /// Word-count target.
    pub target_length: u32,
}

/// Output of the Plan stage. Task order is the generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub topic_analysis: String,
    pub target_audience: String,
    #[serde(rename = "sections")]
    pub tasks: Vec<Task>,
}

impl Plan {
    /// Task kinds in plan order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.kind.as_str())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Output of one Generate stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub content: String,
    pub key_points: Vec<String>,
}

/// Insertion-ordered, kind-keyed collection of generated sections.
///
/// Entries are only ever appended; an existing kind is never overwritten.
/// Serializes as a JSON object whose keys keep production order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    entries: Vec<(String, GeneratedSection)>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == kind)
    }

    pub fn get(&self, kind: &str) -> Option<&GeneratedSection> {
        self.entries
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, section)| section)
    }

    /// Append a section. Returns `false` (and leaves the map untouched) if
    /// `kind` is already present.
    pub fn append(&mut self, kind: impl Into<String>, section: GeneratedSection) -> bool {
        let kind = kind.into();
        if self.contains(&kind) {
            return false;
        }
        self.entries.push((kind, section));
        true
    }

    /// Kinds in production order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// `(kind, section)` pairs in production order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GeneratedSection)> {
        self.entries.iter().map(|(k, s)| (k.as_str(), s))
    }
}

impl Serialize for SectionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (kind, section) in &self.entries {
            map.serialize_entry(kind, section)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SectionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SectionMapVisitor;

        impl<'de> Visitor<'de> for SectionMapVisitor {
            type Value = SectionMap;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of section kind to generated section")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<SectionMap, A::Error> {
                let mut sections = SectionMap::new();
                while let Some((kind, section)) = access.next_entry::<String, GeneratedSection>()? {
                    if !sections.append(kind.clone(), section) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate section kind `{kind}`"
                        )));
                    }
                }
                Ok(sections)
            }
        }

        deserializer.deserialize_map(SectionMapVisitor)
    }
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// A reviewer's edit suggestion for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedEdit {
    #[serde(rename = "section_name")]
    pub section_kind: String,
    pub suggested_edit: String,
}

/// Output of the Review stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// How well the sections flow together, within `0.0..=1.0`.
    pub cohesion_score: f64,
    pub suggested_edits: Vec<SuggestedEdit>,
    /// The consolidated deliverable.
    pub final_version: String,
}

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Bookkeeping for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: RunId,
    /// Model reported by the generation service.
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of generation service calls the run made.
    pub generation_calls: u32,
}

/// Terminal artifact of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run: RunMetrics,
    pub plan: Plan,
    pub sections: SectionMap,
    pub review: ReviewVerdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(text: &str) -> GeneratedSection {
        GeneratedSection {
            content: text.into(),
            key_points: vec![format!("{text} point")],
        }
    }

    #[test]
    fn section_map_keeps_insertion_order() {
        let mut map = SectionMap::new();
        assert!(map.append("zeta", section("z")));
        assert!(map.append("alpha", section("a")));
        assert!(map.append("mid", section("m")));

        let kinds: Vec<&str> = map.kinds().collect();
        assert_eq!(kinds, vec!["zeta", "alpha", "mid"]);

        // serde_json sorts its own maps; ours must not be sorted
        let json = serde_json::to_string(&map).unwrap();
        let zeta = json.find("zeta").unwrap();
        let alpha = json.find("alpha").unwrap();
        assert!(zeta < alpha);
    }

    #[test]
    fn section_map_never_overwrites() {
        let mut map = SectionMap::new();
        assert!(map.append("intro", section("first")));
        assert!(!map.append("intro", section("second")));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("intro").unwrap().content, "first");
    }

    #[test]
    fn section_map_deserialize_preserves_order() {
        let json = r#"{"b":{"content":"B","key_points":[]},"a":{"content":"A","key_points":["x"]}}"#;
        let map: SectionMap = serde_json::from_str(json).unwrap();
        let kinds: Vec<&str> = map.kinds().collect();
        assert_eq!(kinds, vec!["b", "a"]);
        assert_eq!(map.get("a").unwrap().key_points, vec!["x".to_string()]);
    }

    #[test]
    fn task_uses_prompt_field_names() {
        let task = Task {
            kind: "introduction".into(),
            goal: "Set the scene".into(),
            style: "engaging".into(),
            target_length: 200,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["section_type"], "introduction");
        assert_eq!(json["description"], "Set the scene");
        assert_eq!(json["style_guide"], "engaging");
        assert_eq!(json["target_length"], 200);
    }

    #[test]
    fn stage_kind_parses() {
        assert_eq!("review".parse::<StageKind>().unwrap(), StageKind::Review);
        assert!("publish".parse::<StageKind>().is_err());
        assert_eq!(StageKind::Generate.to_string(), "generate");
    }

    #[test]
    fn run_id_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
