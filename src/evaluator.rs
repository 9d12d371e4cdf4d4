use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::Category;
use crate::selections::SelectionSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewStatus {
    Clarifying,
    Ready,
}

/// The category to ask about next, or the terminal marker once everything is filled.
/// Serializes as the category identifier or `"complete"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ask(Category),
    Complete,
}

impl Step {
    pub fn category(&self) -> Option<Category> {
        match self {
            Step::Ask(category) => Some(*category),
            Step::Complete => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Ask(category) => category.as_str(),
            Step::Complete => "complete",
        }
    }
}

impl Serialize for Step {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InterviewStatus::Clarifying => "CLARIFYING",
            InterviewStatus::Ready => "READY",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub missing: Vec<Category>,
    pub current: Step,
    pub status: InterviewStatus,
}

/// Whether every required field of `category` is present. No partial credit.
pub fn is_complete(selections: &SelectionSet, category: Category) -> bool {
    category
        .fields()
        .iter()
        .all(|field| selections.is_present(field.name))
}

/// Computes the missing categories in declaration order, the next step and the status.
pub fn evaluate(selections: &SelectionSet) -> Evaluation {
    let missing: Vec<Category> = Category::ALL
        .iter()
        .copied()
        .filter(|c| !is_complete(selections, *c))
        .collect();

    let current = missing.first().copied().map_or(Step::Complete, Step::Ask);
    let status = if missing.is_empty() {
        InterviewStatus::Ready
    } else {
        InterviewStatus::Clarifying
    };

    Evaluation {
        missing,
        current,
        status,
    }
}
