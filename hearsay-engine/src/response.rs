//! Response types
//!
//! One response per answered question feed, variant matching the feed's
//! species. Completeness predicates take the presented context (samples or
//! scales) so a partially filled MUSHRA/MOS sheet keeps its page incomplete.

use crate::survey::Audio;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// AB preference: the chosen sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbResponse {
    pub value: Audio,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AbResponse {
    pub fn is_complete(&self) -> bool {
        true
    }
}

/// ABX identification: which of A/B the subject matched to X
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbxResponse {
    pub value: Audio,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AbxResponse {
    pub fn is_complete(&self) -> bool {
        true
    }
}

/// One rated sample of a MUSHRA sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MushraResponseBit {
    pub sample_id: Uuid,
    /// Rating on the 0..=100 MUSHRA scale
    pub value: i64,
}

/// MUSHRA ratings, one bit per rated sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MushraResponse {
    pub bits: Vec<MushraResponseBit>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MushraResponse {
    pub fn rating_for(&self, sample_id: Uuid) -> Option<i64> {
        self.bits.iter().find(|b| b.sample_id == sample_id).map(|b| b.value)
    }

    /// Complete once every presented sample has a rating
    pub fn is_complete(&self, presented: &[Audio]) -> bool {
        presented.iter().all(|s| self.rating_for(s.id).is_some())
    }
}

/// Chosen level on one scale of a MOS question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosChoice {
    pub scale_id: Uuid,
    pub level_id: Uuid,
}

/// MOS ratings, one choice per scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosResponse {
    pub choices: Vec<MosChoice>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MosResponse {
    pub fn choice_for(&self, scale_id: Uuid) -> Option<Uuid> {
        self.choices.iter().find(|c| c.scale_id == scale_id).map(|c| c.level_id)
    }

    /// Complete once every scale has a chosen level
    pub fn is_complete(&self, scale_ids: &[Uuid]) -> bool {
        scale_ids.iter().all(|id| self.choice_for(*id).is_some())
    }
}

/// A candidate response of any species, used while recording and validating
/// before it is attached to its feed
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ab(AbResponse),
    Abx(AbxResponse),
    Mushra(MushraResponse),
    Mos(MosResponse),
}

impl Response {
    pub fn species(&self) -> &'static str {
        match self {
            Response::Ab(_) => "ab",
            Response::Abx(_) => "abx",
            Response::Mushra(_) => "mushra",
            Response::Mos(_) => "mos",
        }
    }
}
