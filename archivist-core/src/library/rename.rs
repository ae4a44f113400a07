use std::fmt;
use std::str::FromStr;

use archivist_model::ImageRecord;

use crate::error::ArchiveError;

const PROMPT_WORDS: usize = 5;
const MODEL_TITLE_LIMIT: usize = 30;

/// Title schemes for batch renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenamePattern {
    /// First five words of the prompt.
    PromptSnippet,
    /// `<model>_<n>`.
    ModelSequence,
    /// `YYYY-MM-DD_HH-MM-SS_<n>` from the record date.
    Date,
}

impl RenamePattern {
    /// Title for `record`, the `index`-th (zero based) item of the batch.
    pub fn title_for(&self, record: &ImageRecord, index: usize) -> String {
        let position = index + 1;
        match self {
            RenamePattern::PromptSnippet => {
                let words = record
                    .prompt
                    .split_whitespace()
                    .take(PROMPT_WORDS)
                    .collect::<Vec<_>>()
                    .join(" ");
                let cleaned = words
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                if cleaned.is_empty() {
                    "Untitled".to_string()
                } else {
                    cleaned
                }
            }
            RenamePattern::ModelSequence => {
                let model: String = record
                    .model
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect();
                format!("{model}_{position}")
                    .chars()
                    .take(MODEL_TITLE_LIMIT)
                    .collect()
            }
            RenamePattern::Date => {
                format!("{}_{position}", record.date.format("%Y-%m-%d_%H-%M-%S"))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenamePattern::PromptSnippet => "prompt_snippet",
            RenamePattern::ModelSequence => "model_seq",
            RenamePattern::Date => "date",
        }
    }
}

impl fmt::Display for RenamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenamePattern {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt_snippet" | "prompt" => Ok(RenamePattern::PromptSnippet),
            "model_seq" | "model" => Ok(RenamePattern::ModelSequence),
            "date" => Ok(RenamePattern::Date),
            other => Err(ArchiveError::InvalidOperation(format!(
                "unknown rename pattern '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn prompt_snippet_keeps_five_clean_words() {
        let mut record = ImageRecord::new("x");
        record.prompt = "a (very) fluffy, orange cat sleeping on a mat".into();
        assert_eq!(
            RenamePattern::PromptSnippet.title_for(&record, 0),
            "a very fluffy orange cat"
        );

        record.prompt = "!!! ???".into();
        assert_eq!(RenamePattern::PromptSnippet.title_for(&record, 0), "Untitled");
    }

    #[test]
    fn model_sequence_is_capped() {
        let mut record = ImageRecord::new("x");
        record.model = "sd_xl-base 1.0".into();
        assert_eq!(RenamePattern::ModelSequence.title_for(&record, 2), "sdxlbase10_3");

        record.model = "a".repeat(40);
        assert_eq!(RenamePattern::ModelSequence.title_for(&record, 0).len(), 30);
    }

    #[test]
    fn date_pattern_uses_record_date() {
        let mut record = ImageRecord::new("x");
        record.date = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            RenamePattern::Date.title_for(&record, 0),
            "2024-03-09_14-05-07_1"
        );
    }

    #[test]
    fn parses_pattern_names() {
        assert_eq!("model_seq".parse::<RenamePattern>().unwrap(), RenamePattern::ModelSequence);
        assert!("shuffle".parse::<RenamePattern>().is_err());
    }
}
