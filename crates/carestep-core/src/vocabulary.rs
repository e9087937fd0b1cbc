//! Trigger vocabulary for the text-matching rubric rules.
//!
//! Each topic is a list of regular-expression fragments. A text mentions a
//! topic when any fragment matches anywhere in it (case-insensitive). The
//! lists are the main tuning surface of the local grader and can be replaced
//! from the `[vocabulary]` section of the configuration file.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RubricError;

/// Topics a STEP1 note is checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Clock time, month/day, or part of day.
    Time,
    /// Room or setting.
    Place,
    /// Comparison with the usual state, or a change.
    Change,
    /// Speech, expression, refusal, gaze, gesture.
    Reaction,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Time => write!(f, "time"),
            Topic::Place => write!(f, "place"),
            Topic::Change => write!(f, "change"),
            Topic::Reaction => write!(f, "reaction"),
        }
    }
}

/// Term lists per topic, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default = "default_time_terms")]
    pub time: Vec<String>,
    #[serde(default = "default_place_terms")]
    pub place: Vec<String>,
    #[serde(default = "default_change_terms")]
    pub change: Vec<String>,
    #[serde(default = "default_reaction_terms")]
    pub reaction: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            time: default_time_terms(),
            place: default_place_terms(),
            change: default_change_terms(),
            reaction: default_reaction_terms(),
        }
    }
}

fn to_owned(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

fn default_time_terms() -> Vec<String> {
    to_owned(&[
        r"[0-9]{1,2}[時じ:]",
        r"[0-9]{1,2}月[0-9]{1,2}日",
        "朝",
        "昼",
        "夕方",
        "夜",
        "午前",
        "午後",
    ])
}

fn default_place_terms() -> Vec<String> {
    to_owned(&[
        "フロア",
        "居室",
        "食堂",
        "トイレ",
        "浴室",
        "玄関",
        "廊下",
        "リビング",
        "ベッド",
        "車椅子",
        "テーブル",
        "デイ",
        "訪問",
    ])
}

fn default_change_terms() -> Vec<String> {
    to_owned(&[
        "いつも",
        "普段",
        "以前",
        "変化",
        "今日は",
        "最近",
        "初めて",
        "違う",
        "なかった",
        "なくなった",
        "増えた",
        "減った",
        "できていた",
    ])
}

fn default_reaction_terms() -> Vec<String> {
    to_owned(&[
        "言った",
        "話した",
        "訴えた",
        "表情",
        "笑顔",
        "涙",
        "怒",
        "不安",
        "嫌",
        "痛い",
        "うなずいた",
        "拒否",
        "声",
        "目",
        "視線",
        "手",
        "動",
    ])
}

impl Vocabulary {
    /// Compile every topic into a single matcher.
    pub fn compile(&self) -> Result<CompiledVocabulary, RubricError> {
        Ok(CompiledVocabulary {
            time: compile_topic(Topic::Time, &self.time)?,
            place: compile_topic(Topic::Place, &self.place)?,
            change: compile_topic(Topic::Change, &self.change)?,
            reaction: compile_topic(Topic::Reaction, &self.reaction)?,
        })
    }
}

/// An empty list never matches.
fn compile_topic(topic: Topic, terms: &[String]) -> Result<Option<Regex>, RubricError> {
    let terms: Vec<&str> = terms
        .iter()
        .map(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return Ok(None);
    }
    let pattern = format!("(?i)(?:{})", terms.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| RubricError::InvalidPattern {
            topic: topic.to_string(),
            source,
        })
}

/// Vocabulary ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledVocabulary {
    time: Option<Regex>,
    place: Option<Regex>,
    change: Option<Regex>,
    reaction: Option<Regex>,
}

impl CompiledVocabulary {
    pub fn mentions(&self, topic: Topic, text: &str) -> bool {
        let matcher = match topic {
            Topic::Time => &self.time,
            Topic::Place => &self.place,
            Topic::Change => &self.change,
            Topic::Reaction => &self.reaction,
        };
        matcher.as_ref().is_some_and(|re| re.is_match(text))
    }
}
