//! Declarative response validators
//!
//! Authors can attach validators to a question; they are re-run on every
//! recorded response and a failure blocks persistence without touching
//! previously stored values. Validators are stored at rest as JSON in the
//! questions table.

use crate::feed::Feed;
use crate::response::Response;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ResponseValidator {
    /// The response must be complete before the page counts as answered
    Required,
    /// At least one MUSHRA rating must reach the threshold
    /// (e.g. 90, to catch subjects who never find the hidden reference)
    MushraAnyAtLeast { threshold: i64 },
    /// At least one MUSHRA rating must fall below the threshold
    /// (e.g. 10, to catch subjects who never find the anchor)
    MushraAnyBelow { threshold: i64 },
}

impl ResponseValidator {
    /// Check a candidate response against the feed it answers.
    ///
    /// Validators that do not apply to the candidate's species pass.
    pub fn check(&self, candidate: &Response, feed: &Feed) -> Result<()> {
        match self {
            ResponseValidator::Required => {
                let complete = match (candidate, feed) {
                    (Response::Ab(r), _) => r.is_complete(),
                    (Response::Abx(r), _) => r.is_complete(),
                    (Response::Mushra(r), Feed::Mushra(f)) => r.is_complete(&f.samples),
                    (Response::Mos(r), Feed::Mos(f)) => r.is_complete(&f.scale_ids),
                    _ => false,
                };
                if !complete {
                    return Err(Error::Validation(
                        "You must provide a response before moving on to another question"
                            .to_string(),
                    ));
                }
                Ok(())
            }
            ResponseValidator::MushraAnyAtLeast { threshold } => {
                if let Response::Mushra(r) = candidate {
                    if !r.bits.iter().any(|b| b.value >= *threshold) {
                        return Err(Error::Validation(format!(
                            "At least one sample must be rated {threshold} or above"
                        )));
                    }
                }
                Ok(())
            }
            ResponseValidator::MushraAnyBelow { threshold } => {
                if let Response::Mushra(r) = candidate {
                    if !r.bits.iter().any(|b| b.value < *threshold) {
                        return Err(Error::Validation(format!(
                            "At least one sample must be rated below {threshold}"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MushraFeed;
    use crate::response::{MushraResponse, MushraResponseBit};
    use crate::survey::{Audio, AudioRole};
    use chrono::Utc;
    use uuid::Uuid;

    fn mushra_fixture(ratings: &[i64]) -> (Response, Feed) {
        let samples: Vec<Audio> = ratings
            .iter()
            .enumerate()
            .map(|(i, _)| Audio {
                id: Uuid::new_v4(),
                description: format!("s{i}"),
                system_id: Uuid::new_v4(),
                media: format!("s{i}.wav"),
                role: AudioRole::Stimulus,
            })
            .collect();
        let response = MushraResponse {
            bits: samples
                .iter()
                .zip(ratings)
                .map(|(s, v)| MushraResponseBit { sample_id: s.id, value: *v })
                .collect(),
            started_at: Utc::now(),
            ended_at: None,
        };
        let feed = Feed::Mushra(MushraFeed {
            id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            seed: 0,
            samples,
            response: None,
        });
        (Response::Mushra(response), feed)
    }

    #[test]
    fn any_at_least_rejects_low_sheets() {
        let validator = ResponseValidator::MushraAnyAtLeast { threshold: 90 };
        let (low, feed) = mushra_fixture(&[10, 40, 88]);
        assert!(matches!(validator.check(&low, &feed), Err(Error::Validation(_))));

        let (high, feed) = mushra_fixture(&[10, 40, 95]);
        assert!(validator.check(&high, &feed).is_ok());
    }

    #[test]
    fn any_below_rejects_flat_high_sheets() {
        let validator = ResponseValidator::MushraAnyBelow { threshold: 10 };
        let (high, feed) = mushra_fixture(&[95, 80, 70]);
        assert!(matches!(validator.check(&high, &feed), Err(Error::Validation(_))));

        let (mixed, feed) = mushra_fixture(&[95, 80, 5]);
        assert!(validator.check(&mixed, &feed).is_ok());
    }

    #[test]
    fn required_rejects_partial_mushra() {
        let validator = ResponseValidator::Required;
        let (candidate, feed) = mushra_fixture(&[50, 60]);
        // Drop one bit so a presented sample is unrated
        let partial = match candidate {
            Response::Mushra(mut r) => {
                r.bits.pop();
                Response::Mushra(r)
            }
            other => other,
        };
        assert!(matches!(validator.check(&partial, &feed), Err(Error::Validation(_))));
    }

    #[test]
    fn validators_serialize_to_stable_json() {
        let validators = vec![
            ResponseValidator::Required,
            ResponseValidator::MushraAnyAtLeast { threshold: 90 },
        ];
        let json = serde_json::to_string(&validators).unwrap();
        let back: Vec<ResponseValidator> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, validators);
    }
}
