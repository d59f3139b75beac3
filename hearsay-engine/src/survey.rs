//! Persisted survey model
//!
//! The authored, immutable side of the engine: a survey is an ordered list
//! of sections, each an ordered list of questions over labeled audio
//! samples. Question species are a sum type so every dispatch on them is an
//! exhaustive match.

use crate::validate::ResponseValidator;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an audio sample within a MUSHRA presentation.
///
/// Only meaningful for MUSHRA questions; everything else treats samples
/// uniformly as stimuli.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioRole {
    Reference,
    Anchor,
    Stimulus,
}

impl AudioRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioRole::Reference => "reference",
            AudioRole::Anchor => "anchor",
            AudioRole::Stimulus => "stimulus",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "reference" => Ok(AudioRole::Reference),
            "anchor" => Ok(AudioRole::Anchor),
            "stimulus" => Ok(AudioRole::Stimulus),
            other => Err(Error::Internal(format!("unknown audio role: {other}"))),
        }
    }
}

/// One of the things being compared (e.g. a synthesis method)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: Uuid,
    pub description: String,
}

/// A stimulus: one audio sample produced by one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audio {
    pub id: Uuid,
    pub description: String,
    pub system_id: Uuid,
    /// Reference to the underlying media, resolved by the storage layer
    pub media: String,
    pub role: AudioRole,
}

/// One level of a MOS rating scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosLevel {
    pub id: Uuid,
    pub description: String,
    pub value: f64,
}

/// An ordered set of levels a MOS question is rated on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosScale {
    pub id: Uuid,
    pub description: String,
    /// Levels in authored order
    pub levels: Vec<MosLevel>,
}

impl MosScale {
    pub fn level(&self, id: Uuid) -> Option<&MosLevel> {
        self.levels.iter().find(|l| l.id == id)
    }
}

/// Species-specific question parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuestionKind {
    Ab,
    Abx,
    Mushra {
        /// Anchors to present per feed; None presents all provided
        num_anchors: Option<usize>,
        /// Stimuli (excluding anchors and reference) per feed; None presents all
        num_stimuli: Option<usize>,
    },
    Mos {
        /// Rating scales in authored order
        scales: Vec<MosScale>,
    },
}

impl QuestionKind {
    pub fn species(&self) -> &'static str {
        match self {
            QuestionKind::Ab => "ab",
            QuestionKind::Abx => "abx",
            QuestionKind::Mushra { .. } => "mushra",
            QuestionKind::Mos { .. } => "mos",
        }
    }
}

/// An authored question over a set of candidate samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub description: String,
    pub instruction: Option<String>,
    /// Candidate samples in authored order
    pub samples: Vec<Audio>,
    pub kind: QuestionKind,
    /// Declarative validators re-run on every recorded response
    pub validators: Vec<ResponseValidator>,
}

impl Question {
    pub fn sample(&self, id: Uuid) -> Option<&Audio> {
        self.samples.iter().find(|s| s.id == id)
    }

    pub fn references(&self) -> impl Iterator<Item = &Audio> {
        self.samples.iter().filter(|s| s.role == AudioRole::Reference)
    }

    pub fn anchors(&self) -> impl Iterator<Item = &Audio> {
        self.samples.iter().filter(|s| s.role == AudioRole::Anchor)
    }

    pub fn stimuli(&self) -> impl Iterator<Item = &Audio> {
        self.samples.iter().filter(|s| s.role == AudioRole::Stimulus)
    }
}

/// An ordered group of questions with a shared instruction page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub description: String,
    pub instruction: Option<String>,
    /// Terminal "thank you" marker; must never contain questions
    pub is_end: bool,
    pub questions: Vec<Question>,
}

impl Section {
    /// End sections are closing markers and carry no questions
    pub fn validate(&self) -> Result<()> {
        if self.is_end && !self.questions.is_empty() {
            return Err(Error::Config(
                "End section must not contain questions".to_string(),
            ));
        }
        Ok(())
    }
}

/// The authored survey tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: Uuid,
    /// Short public identifier used to address the survey
    pub uid: String,
    pub description: String,
    pub instruction: Option<String>,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
}

impl Survey {
    /// Number of sections excluding end markers
    pub fn num_sections(&self) -> usize {
        self.sections.iter().filter(|s| !s.is_end).count()
    }

    pub fn num_questions(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }

    /// Look up a question anywhere in the survey
    pub fn question(&self, id: Uuid) -> Option<&Question> {
        self.sections
            .iter()
            .flat_map(|s| s.questions.iter())
            .find(|q| q.id == id)
    }

    pub fn section(&self, id: Uuid) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        for section in &self.sections {
            section.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> System {
        System { id: Uuid::new_v4(), description: "baseline".to_string() }
    }

    fn audio(system_id: Uuid, description: &str, role: AudioRole) -> Audio {
        Audio {
            id: Uuid::new_v4(),
            description: description.to_string(),
            system_id,
            media: format!("{description}.wav"),
            role,
        }
    }

    #[test]
    fn end_section_with_questions_fails_validation() {
        let sys = system();
        let question = Question {
            id: Uuid::new_v4(),
            description: "q".to_string(),
            instruction: None,
            samples: vec![
                audio(sys.id, "x", AudioRole::Stimulus),
                audio(sys.id, "y", AudioRole::Stimulus),
            ],
            kind: QuestionKind::Ab,
            validators: vec![],
        };
        let section = Section {
            id: Uuid::new_v4(),
            description: "fin".to_string(),
            instruction: None,
            is_end: true,
            questions: vec![question],
        };
        assert!(matches!(section.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn num_sections_excludes_end_markers() {
        let survey = Survey {
            id: Uuid::new_v4(),
            uid: "ab12".to_string(),
            description: "s".to_string(),
            instruction: None,
            public: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sections: vec![
                Section {
                    id: Uuid::new_v4(),
                    description: "part 1".to_string(),
                    instruction: None,
                    is_end: false,
                    questions: vec![],
                },
                Section {
                    id: Uuid::new_v4(),
                    description: "fin".to_string(),
                    instruction: None,
                    is_end: true,
                    questions: vec![],
                },
            ],
        };
        assert_eq!(survey.num_sections(), 1);
        assert_eq!(survey.sections.len(), 2);
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [AudioRole::Reference, AudioRole::Anchor, AudioRole::Stimulus] {
            assert_eq!(AudioRole::parse(role.as_str()).unwrap(), role);
        }
        assert!(AudioRole::parse("other").is_err());
    }
}
