//! Question datasets.
//!
//! Each named dataset stores its question under a different field. Files are
//! either a JSON array of objects or JSON lines.

use crate::models::{QuestionRecord, Result, WikiragError};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a named dataset lives and which field holds its question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: &'static str,
    pub default_path: &'static str,
    pub question_field: &'static str,
}

const DATASETS: &[DatasetSpec] = &[
    DatasetSpec {
        name: "cwq",
        default_path: "data/cwq.json",
        question_field: "question",
    },
    DatasetSpec {
        name: "webqsp",
        default_path: "data/WebQSP.json",
        question_field: "RawQuestion",
    },
    DatasetSpec {
        name: "grailqa",
        default_path: "data/grailqa.json",
        question_field: "question",
    },
    DatasetSpec {
        name: "simpleqa",
        default_path: "data/SimpleQA.json",
        question_field: "question",
    },
    DatasetSpec {
        name: "qald",
        default_path: "data/qald_10-en.json",
        question_field: "question",
    },
    DatasetSpec {
        name: "webquestions",
        default_path: "data/WebQuestions.json",
        question_field: "question",
    },
    DatasetSpec {
        name: "trex",
        default_path: "data/T-REX.json",
        question_field: "input",
    },
    DatasetSpec {
        name: "zeroshotre",
        default_path: "data/Zero_Shot_RE.json",
        question_field: "input",
    },
    DatasetSpec {
        name: "creak",
        default_path: "data/creak.json",
        question_field: "sentence",
    },
];

impl DatasetSpec {
    /// Look up a dataset by name (case-insensitive).
    pub fn find(name: &str) -> Result<&'static DatasetSpec> {
        DATASETS
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                let known: Vec<&str> = DATASETS.iter().map(|d| d.name).collect();
                WikiragError::InvalidInput(format!(
                    "unknown dataset '{name}' (known: {})",
                    known.join(", ")
                ))
            })
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        DATASETS.iter().map(|d| d.name)
    }

    /// Resolve the file to read, preferring an explicit override.
    pub fn path(&self, override_path: Option<&Path>) -> PathBuf {
        override_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(self.default_path))
    }

    /// Load every record of this dataset from `path`.
    pub fn load(&self, path: &Path) -> Result<Vec<QuestionRecord>> {
        let raw = read_raw_records(path)?;
        let records = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| parse_record(index, &value, self.question_field))
            .collect::<Result<Vec<_>>>()?;

        info!(
            dataset = self.name,
            path = %path.display(),
            count = records.len(),
            "Loaded dataset"
        );
        Ok(records)
    }
}

fn read_raw_records(path: &Path) -> Result<Vec<Value>> {
    let is_jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

    let file = File::open(path).map_err(|e| WikiragError::io("opening dataset file", e))?;
    let reader = BufReader::new(file);

    if is_jsonl {
        let mut values = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| WikiragError::io("reading dataset file", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let value = serde_json::from_str(&line).map_err(|e| {
                WikiragError::ParseError(format!("Line {}: {}", line_num + 1, e))
            })?;
            values.push(value);
        }
        Ok(values)
    } else {
        serde_json::from_reader::<_, Vec<Value>>(reader).map_err(|e| {
            WikiragError::ParseError(format!("{}: expected a JSON array: {e}", path.display()))
        })
    }
}

fn parse_record(index: usize, value: &Value, question_field: &str) -> Result<QuestionRecord> {
    let question = value
        .get(question_field)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            WikiragError::ParseError(format!(
                "record {index}: missing string field '{question_field}'"
            ))
        })?
        .to_string();

    Ok(QuestionRecord {
        index,
        question,
        topic_entity: topic_entities(value.get("topic_entity")),
    })
}

/// Topic entities may be a list of ids, an `{id: label}` map, or a single id.
fn topic_entities(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
