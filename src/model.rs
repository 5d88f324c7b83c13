use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The four migratable entity types, in full-migration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "kebab-case")]
pub enum EntityKind {
    Suite,
    Section,
    SharedStep,
    Case,
}

impl EntityKind {
    pub const FULL_ORDER: [EntityKind; 4] = [
        EntityKind::Suite,
        EntityKind::Section,
        EntityKind::SharedStep,
        EntityKind::Case,
    ];

    /// Plural stem used in snapshot file names and messages.
    pub fn stem(self) -> &'static str {
        match self {
            Self::Suite => "suites",
            Self::Section => "sections",
            Self::SharedStep => "shared_steps",
            Self::Case => "cases",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stem())
    }
}

/// One row of a step list, shared by cases and shared steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_step_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedStep {
    pub id: u64,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub case_ids: Vec<u64>,
    #[serde(
        rename = "custom_steps_separated",
        default,
        deserialize_with = "null_as_default"
    )]
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<u64>,
    #[serde(
        rename = "custom_steps_separated",
        default,
        deserialize_with = "null_as_default"
    )]
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Common read-only view over fetched entity snapshots.
pub trait Snapshot: Clone + Serialize + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> u64;

    /// Human-readable title or name.
    fn label(&self) -> &str;

    fn extra(&self) -> &Map<String, Value>;

    /// Resolve the comparison field. `title` and `name` both address the
    /// label; anything else is looked up among the remaining API fields.
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "title" | "name" => Some(self.label().to_string()),
            other => match self.extra().get(other)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            },
        }
    }
}

impl Snapshot for Suite {
    const KIND: EntityKind = EntityKind::Suite;

    fn id(&self) -> u64 {
        self.id
    }
    fn label(&self) -> &str {
        &self.name
    }
    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl Snapshot for Section {
    const KIND: EntityKind = EntityKind::Section;

    fn id(&self) -> u64 {
        self.id
    }
    fn label(&self) -> &str {
        &self.name
    }
    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl Snapshot for SharedStep {
    const KIND: EntityKind = EntityKind::SharedStep;

    fn id(&self) -> u64 {
        self.id
    }
    fn label(&self) -> &str {
        &self.title
    }
    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl Snapshot for Case {
    const KIND: EntityKind = EntityKind::Case;

    fn id(&self) -> u64 {
        self.id
    }
    fn label(&self) -> &str {
        &self.title
    }
    fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddSuite {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddSection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddSharedStep {
    pub title: String,
    #[serde(rename = "custom_steps_separated")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddCase {
    pub title: String,
    #[serde(rename = "custom_steps_separated", skip_serializing_if = "Vec::is_empty", default)]
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Fields the API assigns itself; never sent back on create.
const SERVER_OWNED_CASE_FIELDS: &[&str] = &[
    "id",
    "section_id",
    "suite_id",
    "created_by",
    "created_on",
    "updated_by",
    "updated_on",
    "is_deleted",
];

impl From<&Suite> for AddSuite {
    fn from(suite: &Suite) -> Self {
        Self {
            name: suite.name.clone(),
            description: suite.description.clone(),
        }
    }
}

impl From<&SharedStep> for AddSharedStep {
    fn from(step: &SharedStep) -> Self {
        Self {
            title: step.title.clone(),
            steps: step.steps.clone(),
        }
    }
}

impl From<&Case> for AddCase {
    fn from(case: &Case) -> Self {
        let mut fields = case.extra.clone();
        for key in SERVER_OWNED_CASE_FIELDS {
            fields.remove(*key);
        }
        Self {
            title: case.title.clone(),
            steps: case.steps.clone(),
            fields,
        }
    }
}
