//! Feed instances
//!
//! A feed is the live, subject-specific instantiation of a question or
//! section: the per-subject seed, the sample arrangement that seed produced,
//! and (once answered) the response. The `Feed` sum type replaces the
//! original string-tagged hierarchy so completion and recording dispatch are
//! exhaustive matches.

use crate::response::{AbResponse, AbxResponse, MosResponse, MushraResponse};
use crate::survey::Audio;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Section cover page; always complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionFeed {
    pub id: Uuid,
    pub section_id: Uuid,
}

/// AB preference feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbFeed {
    pub id: Uuid,
    pub question_id: Uuid,
    /// Fixes every pseudo-random draw for this feed; assigned once, immutable
    pub seed: i64,
    /// Samples in assignment order ("A" then "B")
    pub samples: Vec<Audio>,
    pub response: Option<AbResponse>,
}

/// ABX identification feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbxFeed {
    pub id: Uuid,
    pub question_id: Uuid,
    pub seed: i64,
    /// Samples in assignment order ("A" then "B"; "X" is re-derived from the seed)
    pub samples: Vec<Audio>,
    pub response: Option<AbxResponse>,
}

/// MUSHRA sheet feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MushraFeed {
    pub id: Uuid,
    pub question_id: Uuid,
    pub seed: i64,
    /// Presented samples in ordinal position order
    pub samples: Vec<Audio>,
    pub response: Option<MushraResponse>,
}

/// MOS rating feed: one fixed sample rated on every scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosFeed {
    pub id: Uuid,
    pub question_id: Uuid,
    pub seed: i64,
    pub sample: Audio,
    /// The question's scales in authored order; one response slot each
    pub scale_ids: Vec<Uuid>,
    pub response: Option<MosResponse>,
}

/// Terminal chain marker; always complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndFeed {
    pub id: Uuid,
}

/// The live instantiation of one page's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Feed {
    Section(SectionFeed),
    Ab(AbFeed),
    Abx(AbxFeed),
    Mushra(MushraFeed),
    Mos(MosFeed),
    End(EndFeed),
}

impl Feed {
    pub fn id(&self) -> Uuid {
        match self {
            Feed::Section(f) => f.id,
            Feed::Ab(f) => f.id,
            Feed::Abx(f) => f.id,
            Feed::Mushra(f) => f.id,
            Feed::Mos(f) => f.id,
            Feed::End(f) => f.id,
        }
    }

    /// Stable species tag, used for persistence and logging
    pub fn species(&self) -> &'static str {
        match self {
            Feed::Section(_) => "section",
            Feed::Ab(_) => "ab",
            Feed::Abx(_) => "abx",
            Feed::Mushra(_) => "mushra",
            Feed::Mos(_) => "mos",
            Feed::End(_) => "end",
        }
    }

    /// Marker feeds carry no question and are always complete
    pub fn is_marker(&self) -> bool {
        matches!(self, Feed::Section(_) | Feed::End(_))
    }

    pub fn question_id(&self) -> Option<Uuid> {
        match self {
            Feed::Section(_) | Feed::End(_) => None,
            Feed::Ab(f) => Some(f.question_id),
            Feed::Abx(f) => Some(f.question_id),
            Feed::Mushra(f) => Some(f.question_id),
            Feed::Mos(f) => Some(f.question_id),
        }
    }

    pub fn seed(&self) -> Option<i64> {
        match self {
            Feed::Section(_) | Feed::End(_) => None,
            Feed::Ab(f) => Some(f.seed),
            Feed::Abx(f) => Some(f.seed),
            Feed::Mushra(f) => Some(f.seed),
            Feed::Mos(f) => Some(f.seed),
        }
    }

    /// A feed is complete when its response exists and is itself complete;
    /// markers are complete by definition
    pub fn is_complete(&self) -> bool {
        match self {
            Feed::Section(_) | Feed::End(_) => true,
            Feed::Ab(f) => f.response.as_ref().map_or(false, |r| r.is_complete()),
            Feed::Abx(f) => f.response.as_ref().map_or(false, |r| r.is_complete()),
            Feed::Mushra(f) => {
                f.response.as_ref().map_or(false, |r| r.is_complete(&f.samples))
            }
            Feed::Mos(f) => {
                f.response.as_ref().map_or(false, |r| r.is_complete(&f.scale_ids))
            }
        }
    }

    pub fn has_response(&self) -> bool {
        match self {
            Feed::Section(_) | Feed::End(_) => false,
            Feed::Ab(f) => f.response.is_some(),
            Feed::Abx(f) => f.response.is_some(),
            Feed::Mushra(f) => f.response.is_some(),
            Feed::Mos(f) => f.response.is_some(),
        }
    }
}
