//! Survey definition input
//!
//! The in-memory tree handed over by the definition-loading collaborator
//! (a content author's script, a config file, an admin UI). Plain data,
//! no identifiers yet: `SurveyService::create_survey` validates a tree,
//! assigns ids and the public uid, and persists it.

use crate::validate::ResponseValidator;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A system under comparison, keyed by its description
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemDef {
    pub description: String,
}

impl SystemDef {
    pub fn new(description: &str) -> Self {
        Self { description: description.to_string() }
    }
}

/// Audio role within a MUSHRA presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioRoleDef {
    Reference,
    Anchor,
    #[default]
    Stimulus,
}

/// One stimulus definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioDef {
    pub description: String,
    pub system: SystemDef,
    /// Media reference handed to the storage collaborator
    pub media: String,
    pub role: AudioRoleDef,
}

impl AudioDef {
    pub fn new(description: &str, system: SystemDef, media: &str) -> Self {
        Self {
            description: description.to_string(),
            system,
            media: media.to_string(),
            role: AudioRoleDef::Stimulus,
        }
    }

    pub fn with_role(mut self, role: AudioRoleDef) -> Self {
        self.role = role;
        self
    }
}

/// One level of a MOS scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosLevelDef {
    pub description: String,
    pub value: f64,
}

/// One MOS rating scale; levels keep their authored order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosScaleDef {
    pub description: String,
    pub levels: Vec<MosLevelDef>,
}

/// Species-specific question parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuestionKindDef {
    Ab,
    Abx,
    Mushra { num_anchors: Option<usize>, num_stimuli: Option<usize> },
    Mos { scales: Vec<MosScaleDef> },
}

/// One question definition over its candidate samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDef {
    pub description: String,
    pub instruction: Option<String>,
    pub samples: Vec<AudioDef>,
    pub kind: QuestionKindDef,
    pub validators: Vec<ResponseValidator>,
}

impl QuestionDef {
    pub fn new(description: &str, kind: QuestionKindDef) -> Self {
        Self {
            description: description.to_string(),
            instruction: None,
            samples: Vec::new(),
            kind,
            validators: Vec::new(),
        }
    }
}

/// One section definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDef {
    pub description: String,
    pub instruction: Option<String>,
    pub is_end: bool,
    pub questions: Vec<QuestionDef>,
}

impl SectionDef {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            instruction: None,
            is_end: false,
            questions: Vec::new(),
        }
    }

    /// Closing "thank you" marker; must stay empty of questions
    pub fn end(description: &str) -> Self {
        Self {
            description: description.to_string(),
            instruction: None,
            is_end: true,
            questions: Vec::new(),
        }
    }
}

/// The full authored tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyDef {
    pub description: String,
    pub instruction: Option<String>,
    pub public: bool,
    pub sections: Vec<SectionDef>,
}

impl SurveyDef {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            instruction: None,
            public: false,
            sections: Vec::new(),
        }
    }

    /// Authoring-time validation: structural errors surface here, before
    /// any subject can be allocated against a broken survey.
    pub fn validate(&self) -> Result<()> {
        for section in &self.sections {
            if section.is_end && !section.questions.is_empty() {
                return Err(Error::Config(format!(
                    "End section '{}' must not contain questions",
                    section.description
                )));
            }
            for question in &section.questions {
                self.validate_question(question)?;
            }
        }
        Ok(())
    }

    fn validate_question(&self, question: &QuestionDef) -> Result<()> {
        match &question.kind {
            QuestionKindDef::Ab | QuestionKindDef::Abx => {
                if question.samples.len() != 2 {
                    return Err(Error::Config(format!(
                        "question '{}' needs exactly two samples to compare, has {}",
                        question.description,
                        question.samples.len()
                    )));
                }
            }
            QuestionKindDef::Mushra { num_anchors, num_stimuli } => {
                let n_refs = question
                    .samples
                    .iter()
                    .filter(|s| s.role == AudioRoleDef::Reference)
                    .count();
                let n_anchors = question
                    .samples
                    .iter()
                    .filter(|s| s.role == AudioRoleDef::Anchor)
                    .count();
                let n_stimuli = question
                    .samples
                    .iter()
                    .filter(|s| s.role == AudioRoleDef::Stimulus)
                    .count();
                if n_refs != 1 {
                    return Err(Error::Config(format!(
                        "MUSHRA question '{}' needs exactly one reference, has {n_refs}",
                        question.description
                    )));
                }
                if n_anchors < 1 {
                    return Err(Error::Config(format!(
                        "MUSHRA question '{}' needs at least one anchor",
                        question.description
                    )));
                }
                if num_anchors.map_or(false, |n| n < 1 || n > n_anchors) {
                    return Err(Error::Config(format!(
                        "MUSHRA question '{}' anchor cap does not fit the pool of {n_anchors}",
                        question.description
                    )));
                }
                if num_stimuli.map_or(false, |n| n > n_stimuli) {
                    return Err(Error::Config(format!(
                        "MUSHRA question '{}' stimulus cap does not fit the pool of {n_stimuli}",
                        question.description
                    )));
                }
            }
            QuestionKindDef::Mos { scales } => {
                if question.samples.is_empty() {
                    return Err(Error::Config(format!(
                        "MOS question '{}' has no samples",
                        question.description
                    )));
                }
                if scales.is_empty() {
                    return Err(Error::Config(format!(
                        "MOS question '{}' needs at least one scale",
                        question.description
                    )));
                }
                for scale in scales {
                    if scale.levels.is_empty() {
                        return Err(Error::Config(format!(
                            "scale '{}' needs at least one level",
                            scale.description
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
