//! Ordered extraction schema.
//!
//! The schema is a flat list of `{name, description}` pairs. The same list
//! drives prompt rendering ([`Schema::format_instructions`]) and response
//! parsing ([`Schema::parse_record`]), so no field needs bespoke code.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::record::PaperRecord;

/// One column of the extraction schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub description: String,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema has no fields")]
    Empty,
    #[error("schema field #{0} has an empty name")]
    EmptyName(usize),
    #[error("duplicate schema field: {0}")]
    Duplicate(String),
}

#[derive(Error, Debug)]
pub enum SchemaParseError {
    #[error("no JSON object found in model output")]
    NoJson,
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// The built-in academic paper fields, in column order.
const ACADEMIC_PAPER_FIELDS: &[(&str, &str)] = &[
    ("Title", "The title of the paper."),
    ("Authors", "List of authors of the paper."),
    (
        "Date_Published",
        "Date when the paper was published or submitted.",
    ),
    ("Link", "Web link to the paper."),
    (
        "Comments",
        "Comments about the paper, such as publication status or venue.",
    ),
    ("TLDR", "A one or two line summary of the paper."),
    (
        "Relevance",
        "A score between 1 and 5 stating how relevant this paper is to your work.",
    ),
    (
        "Tags",
        "Research topic tags, conference names, or other useful groupings.",
    ),
    (
        "Paper_Summary",
        "Summary of the paper including its hypothesis and what was done.",
    ),
    (
        "Issues_Addressed_by_the_Paper",
        "Description of the issues that the paper addresses.",
    ),
    (
        "Problem_Setting",
        "The problem setting of the paper, including specifics like the environment, rewards, and evaluation settings.",
    ),
    (
        "Methodology",
        "Description of the methods used to approach the problem.",
    ),
    (
        "Assumptions",
        "Assumptions made in the paper and their validity.",
    ),
    (
        "Prominent_Formulas",
        "Important formulas used or introduced in the paper.",
    ),
    (
        "Results",
        "Theoretical or empirical results, including main graphs and tables.",
    ),
    (
        "Limitations",
        "Limitations of the work as mentioned by the authors or observed by the reader.",
    ),
    (
        "Confusing_Aspects",
        "Aspects of the paper that are confusing or need better explanations.",
    ),
    (
        "Authors_Conclusions",
        "The conclusions drawn by the authors about their results.",
    ),
    ("My_Conclusion", "Personal conclusions about the paper."),
    (
        "Rating",
        "A rating of the paper (e.g., Fine, Good, Great).",
    ),
    (
        "Possible_Future_Work",
        "Suggestions for potential future research or improvements based on the paper.",
    ),
    (
        "Relation_to_Own_Work",
        "How the paper relates to your own work, if applicable.",
    ),
    (
        "Learn_from_Approach",
        "What can be learned from the paper's approach and methodology.",
    ),
    (
        "How_Are_We_Different",
        "Differences between your approach and the paper's approach.",
    ),
    (
        "Extra_Info",
        "Any extra information such as cited references, related papers, source code links, blog posts, or other relevant links.",
    ),
];

/// An ordered, validated list of extraction fields.
///
/// Cheap to share: records hold an `Arc<Schema>` so they can resolve field
/// names without copying the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    /// Build a schema, rejecting empty lists, blank names and duplicates.
    pub fn new(fields: Vec<SchemaField>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyName(i));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::Duplicate(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// The 25-column academic paper schema.
    pub fn academic_paper() -> Self {
        Self {
            fields: ACADEMIC_PAPER_FIELDS
                .iter()
                .map(|(name, description)| SchemaField::new(*name, *description))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column index of `name`, if declared.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// JSON schema describing the expected model output.
    ///
    /// Properties are emitted in declaration order (serde_json is built with
    /// `preserve_order`).
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                json!({
                    "title": field.name.replace('_', " "),
                    "description": field.description,
                    "type": "string",
                }),
            );
        }
        let required: Vec<&str> = self.field_names().collect();
        json!({
            "properties": properties,
            "required": required,
        })
    }

    /// Instructions telling the model what shape its answer must have.
    pub fn format_instructions(&self) -> String {
        let schema = serde_json::to_string(&self.json_schema()).unwrap_or_default();
        format!(
            "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\
             \n\
             As an example, for the schema {{\"properties\": {{\"foo\": {{\"title\": \"Foo\", \"description\": \"a list of strings\", \"type\": \"array\", \"items\": {{\"type\": \"string\"}}}}}}, \"required\": [\"foo\"]}}\n\
             the object {{\"foo\": [\"bar\", \"baz\"]}} is a well-formatted instance of the schema. \
             The object {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not well-formatted.\n\
             \n\
             Here is the output schema:\n\
             ```\n\
             {schema}\n\
             ```\n\
             Every value must be a single JSON string. Use an empty string when the paper does not provide the information."
        )
    }

    /// Parse model output into a record with exactly this schema's fields.
    ///
    /// Missing and null fields become `""`; undeclared keys are dropped.
    pub fn parse_record(self: &Arc<Self>, payload: &str) -> Result<PaperRecord, SchemaParseError> {
        let value: Value = match serde_json::from_str(payload.trim()) {
            Ok(value) => value,
            Err(_) => {
                let block = extract_json_block(payload).ok_or(SchemaParseError::NoJson)?;
                serde_json::from_str(block)?
            }
        };
        let Value::Object(map) = value else {
            return Err(SchemaParseError::NotAnObject(json_kind(&value)));
        };

        let extra: Vec<&str> = map
            .keys()
            .filter(|k| self.position(k).is_none())
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            tracing::debug!(keys = ?extra, "dropping undeclared keys from model output");
        }

        let values = self
            .fields
            .iter()
            .map(|f| map.get(&f.name).map(cell_text).unwrap_or_default())
            .collect();
        Ok(PaperRecord::from_values(Arc::clone(self), values))
    }
}

/// Locate the JSON object inside a model response that is not itself JSON.
///
/// Handles fenced ```` ```json ```` blocks, bare fences, and objects embedded
/// in prose. The closing fence is the last one, so fences quoted inside
/// string values stay in the block.
fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.rfind("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.rfind("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ if trimmed.starts_with('[') => Some(trimmed),
        _ => None,
    }
}

/// Render a JSON value as a single spreadsheet cell.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(_) => value.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
