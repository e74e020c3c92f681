//! Categorical-to-integer label encoding
//!
//! One encoder per categorical column. Classes are stored sorted, so codes
//! are stable regardless of row order, and unseen values at scoring time
//! are surfaced as `None` for the transform layer to reject explicitly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit over the observed value set; duplicates collapse, classes sort.
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    /// Integer code for a value seen at fit time; `None` for unseen values.
    pub fn encode(&self, value: &str) -> Option<u32> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
            .map(|idx| idx as u32)
    }

    /// Original string for a code produced by `encode`.
    pub fn decode(&self, code: u32) -> Option<&str> {
        self.classes.get(code as usize).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}
