//! Response recording and validation
//!
//! Decodes a raw submission against the same seed-derived mapping that
//! rendered the feed, validates it, and attaches it to the feed. A rejected
//! submission leaves the feed untouched; a repeated submission replaces the
//! prior response in place.

use crate::assign::{ab_assignment, abx_assignment, mushra_assignment};
use crate::feed::Feed;
use crate::response::{
    AbResponse, AbxResponse, MosChoice, MosResponse, MushraResponse, MushraResponseBit, Response,
};
use crate::survey::{Question, QuestionKind};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Maximum MUSHRA rating (inclusive); the scale runs 0..=100
pub const MUSHRA_MAX_RATING: i64 = 100;

/// Raw submitted values, as handed over by the request-handling layer
#[derive(Debug, Clone, PartialEq)]
pub enum RawSubmission {
    /// AB/ABX: the chosen label ("A" or "B")
    Choice(String),
    /// MUSHRA: ordinal position → rating
    Ratings(BTreeMap<usize, i64>),
    /// MOS: scale id → chosen level id
    MosChoices(BTreeMap<Uuid, Uuid>),
}

/// Decode, validate and attach one submission to its feed.
///
/// The label→sample mapping is re-derived from the feed's stored seed, so a
/// submitted "B" resolves to the same stimulus the subject heard as "B".
pub fn record(question: &Question, feed: &mut Feed, raw: &RawSubmission) -> Result<()> {
    let candidate = build_response(question, feed, raw)?;

    for validator in &question.validators {
        validator.check(&candidate, feed)?;
    }

    attach(feed, candidate)?;
    debug!(feed = %feed.id(), species = feed.species(), "recorded response");
    Ok(())
}

fn build_response(question: &Question, feed: &Feed, raw: &RawSubmission) -> Result<Response> {
    match feed {
        Feed::Section(_) | Feed::End(_) => Err(Error::InvalidSelection(
            "marker pages do not take responses".to_string(),
        )),
        Feed::Ab(f) => {
            let RawSubmission::Choice(label) = raw else {
                return Err(Error::InvalidSelection(
                    "AB question expects a single label".to_string(),
                ));
            };
            let assignment = ab_assignment(question, f.seed)?;
            let value = assignment
                .get(label)
                .ok_or_else(|| {
                    Error::InvalidSelection(format!("'{label}' is not one of the options"))
                })?
                .clone();
            Ok(Response::Ab(AbResponse {
                value,
                started_at: Utc::now(),
                ended_at: None,
            }))
        }
        Feed::Abx(f) => {
            let RawSubmission::Choice(label) = raw else {
                return Err(Error::InvalidSelection(
                    "ABX question expects a single label".to_string(),
                ));
            };
            let assignment = abx_assignment(question, f.seed)?;
            // Only A/B are answers; X is the probe being identified
            let value = assignment
                .answer(label)
                .ok_or_else(|| {
                    Error::InvalidSelection(format!("'{label}' is not one of the options"))
                })?
                .clone();
            Ok(Response::Abx(AbxResponse {
                value,
                started_at: Utc::now(),
                ended_at: None,
            }))
        }
        Feed::Mushra(f) => {
            let RawSubmission::Ratings(ratings) = raw else {
                return Err(Error::InvalidSelection(
                    "MUSHRA question expects per-sample ratings".to_string(),
                ));
            };
            let (num_anchors, num_stimuli) = match &question.kind {
                QuestionKind::Mushra { num_anchors, num_stimuli } => (*num_anchors, *num_stimuli),
                _ => {
                    return Err(Error::Internal(format!(
                        "feed {} is MUSHRA but question {} is {}",
                        f.id,
                        question.id,
                        question.kind.species()
                    )))
                }
            };
            let assignment = mushra_assignment(question, num_anchors, num_stimuli, f.seed)?;
            let mut bits = Vec::with_capacity(ratings.len());
            for (&position, &value) in ratings {
                if !(0..=MUSHRA_MAX_RATING).contains(&value) {
                    return Err(Error::OutOfRange(format!(
                        "rating {value} for position {position} is outside 0..={MUSHRA_MAX_RATING}"
                    )));
                }
                let sample = assignment.get(position).ok_or_else(|| {
                    Error::InvalidSelection(format!("position {position} was not presented"))
                })?;
                bits.push(MushraResponseBit { sample_id: sample.id, value });
            }
            Ok(Response::Mushra(MushraResponse {
                bits,
                started_at: Utc::now(),
                ended_at: None,
            }))
        }
        Feed::Mos(f) => {
            let RawSubmission::MosChoices(choices) = raw else {
                return Err(Error::InvalidSelection(
                    "MOS question expects per-scale choices".to_string(),
                ));
            };
            let QuestionKind::Mos { scales } = &question.kind else {
                return Err(Error::Internal(format!(
                    "feed {} is MOS but question {} is {}",
                    f.id,
                    question.id,
                    question.kind.species()
                )));
            };
            // The fixed sample is part of the feed, not the submission;
            // validate it still belongs to the question
            if question.sample(f.sample.id).is_none() {
                return Err(Error::Internal(format!(
                    "feed {} carries sample {} not in its question",
                    f.id, f.sample.id
                )));
            }
            let mut recorded = Vec::with_capacity(choices.len());
            for (&scale_id, &level_id) in choices {
                let scale = scales.iter().find(|s| s.id == scale_id).ok_or_else(|| {
                    Error::InvalidSelection(format!("scale {scale_id} is not part of this question"))
                })?;
                if scale.level(level_id).is_none() {
                    return Err(Error::InvalidSelection(format!(
                        "level {level_id} does not belong to scale '{}'",
                        scale.description
                    )));
                }
                recorded.push(MosChoice { scale_id, level_id });
            }
            Ok(Response::Mos(MosResponse {
                choices: recorded,
                started_at: Utc::now(),
                ended_at: None,
            }))
        }
    }
}

/// Move the candidate into the feed, replacing any prior response
fn attach(feed: &mut Feed, candidate: Response) -> Result<()> {
    match (feed, candidate) {
        (Feed::Ab(f), Response::Ab(r)) => {
            f.response = Some(r);
            Ok(())
        }
        (Feed::Abx(f), Response::Abx(r)) => {
            f.response = Some(r);
            Ok(())
        }
        (Feed::Mushra(f), Response::Mushra(r)) => {
            f.response = Some(r);
            Ok(())
        }
        (Feed::Mos(f), Response::Mos(r)) => {
            f.response = Some(r);
            Ok(())
        }
        (feed, candidate) => Err(Error::Internal(format!(
            "{} response cannot attach to {} feed",
            candidate.species(),
            feed.species()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocate::build_feed;
    use crate::survey::{Audio, AudioRole, MosLevel, MosScale};
    use crate::validate::ResponseValidator;

    fn audio(description: &str, role: AudioRole) -> Audio {
        Audio {
            id: Uuid::new_v4(),
            description: description.to_string(),
            system_id: Uuid::new_v4(),
            media: format!("{description}.wav"),
            role,
        }
    }

    fn ab_question() -> Question {
        Question {
            id: Uuid::new_v4(),
            description: "prefer?".to_string(),
            instruction: None,
            samples: vec![audio("x", AudioRole::Stimulus), audio("y", AudioRole::Stimulus)],
            kind: QuestionKind::Ab,
            validators: vec![],
        }
    }

    fn mushra_question() -> Question {
        Question {
            id: Uuid::new_v4(),
            description: "rate all".to_string(),
            instruction: None,
            samples: vec![
                audio("ref", AudioRole::Reference),
                audio("anchor", AudioRole::Anchor),
                audio("stim1", AudioRole::Stimulus),
                audio("stim2", AudioRole::Stimulus),
            ],
            kind: QuestionKind::Mushra { num_anchors: None, num_stimuli: None },
            validators: vec![],
        }
    }

    #[test]
    fn ab_choice_resolves_through_the_seed_mapping() {
        let question = ab_question();
        let mut feed = build_feed(&question, 1234).unwrap();

        let expected_b = ab_assignment(&question, 1234).unwrap().b;
        record(&question, &mut feed, &RawSubmission::Choice("B".to_string())).unwrap();

        let Feed::Ab(f) = &feed else { panic!("expected AB feed") };
        assert_eq!(f.response.as_ref().unwrap().value, expected_b);
        assert!(feed.is_complete());
    }

    #[test]
    fn unknown_label_is_rejected_without_state_change() {
        let question = ab_question();
        let mut feed = build_feed(&question, 5).unwrap();

        let err = record(&question, &mut feed, &RawSubmission::Choice("C".to_string()));
        assert!(matches!(err, Err(Error::InvalidSelection(_))));
        assert!(!feed.has_response());
    }

    #[test]
    fn abx_rejects_x_as_an_answer() {
        let question = ab_question();
        let question = Question { kind: QuestionKind::Abx, ..question };
        let mut feed = build_feed(&question, 6).unwrap();

        let err = record(&question, &mut feed, &RawSubmission::Choice("X".to_string()));
        assert!(matches!(err, Err(Error::InvalidSelection(_))));

        record(&question, &mut feed, &RawSubmission::Choice("A".to_string())).unwrap();
        assert!(feed.is_complete());
    }

    #[test]
    fn mushra_rating_out_of_range_is_rejected_and_nothing_persists() {
        let question = mushra_question();
        let mut feed = build_feed(&question, 99).unwrap();

        let mut ratings = BTreeMap::new();
        ratings.insert(0usize, 150i64);
        let err = record(&question, &mut feed, &RawSubmission::Ratings(ratings));
        assert!(matches!(err, Err(Error::OutOfRange(_))));
        assert!(!feed.has_response());
    }

    #[test]
    fn mushra_partial_sheet_records_but_stays_incomplete() {
        let question = mushra_question();
        let mut feed = build_feed(&question, 99).unwrap();

        let mut ratings = BTreeMap::new();
        ratings.insert(0usize, 80i64);
        record(&question, &mut feed, &RawSubmission::Ratings(ratings)).unwrap();
        assert!(feed.has_response());
        assert!(!feed.is_complete());

        // Finish the sheet; resubmission replaces the prior response
        let n = match &feed {
            Feed::Mushra(f) => f.samples.len(),
            _ => unreachable!(),
        };
        let ratings: BTreeMap<usize, i64> = (0..n).map(|p| (p, 40)).collect();
        record(&question, &mut feed, &RawSubmission::Ratings(ratings)).unwrap();
        assert!(feed.is_complete());
        let Feed::Mushra(f) = &feed else { unreachable!() };
        assert_eq!(f.response.as_ref().unwrap().bits.len(), n);
    }

    #[test]
    fn mushra_bits_key_by_the_presented_sample() {
        let question = mushra_question();
        let (num_anchors, num_stimuli) = match &question.kind {
            QuestionKind::Mushra { num_anchors, num_stimuli } => (*num_anchors, *num_stimuli),
            _ => unreachable!(),
        };
        let mut feed = build_feed(&question, 321).unwrap();
        let assignment = mushra_assignment(&question, num_anchors, num_stimuli, 321).unwrap();

        let mut ratings = BTreeMap::new();
        ratings.insert(2usize, 66i64);
        record(&question, &mut feed, &RawSubmission::Ratings(ratings)).unwrap();

        let Feed::Mushra(f) = &feed else { unreachable!() };
        let bit = &f.response.as_ref().unwrap().bits[0];
        assert_eq!(bit.sample_id, assignment.get(2).unwrap().id);
        assert_eq!(bit.value, 66);
    }

    #[test]
    fn mos_choice_must_belong_to_its_scale() {
        let scale_a = MosScale {
            id: Uuid::new_v4(),
            description: "naturalness".to_string(),
            levels: vec![
                MosLevel { id: Uuid::new_v4(), description: "poor".to_string(), value: 1.0 },
                MosLevel { id: Uuid::new_v4(), description: "good".to_string(), value: 5.0 },
            ],
        };
        let scale_b = MosScale {
            id: Uuid::new_v4(),
            description: "quality".to_string(),
            levels: vec![
                MosLevel { id: Uuid::new_v4(), description: "bad".to_string(), value: -2.0 },
                MosLevel { id: Uuid::new_v4(), description: "fine".to_string(), value: 0.0 },
            ],
        };
        let question = Question {
            id: Uuid::new_v4(),
            description: "rate".to_string(),
            instruction: None,
            samples: vec![audio("x", AudioRole::Stimulus)],
            kind: QuestionKind::Mos { scales: vec![scale_a.clone(), scale_b.clone()] },
            validators: vec![],
        };
        let mut feed = build_feed(&question, 10).unwrap();

        // A level from scale B submitted for scale A is rejected
        let mut choices = BTreeMap::new();
        choices.insert(scale_a.id, scale_b.levels[0].id);
        let err = record(&question, &mut feed, &RawSubmission::MosChoices(choices));
        assert!(matches!(err, Err(Error::InvalidSelection(_))));
        assert!(!feed.has_response());

        // One choice per scale completes the feed
        let mut choices = BTreeMap::new();
        choices.insert(scale_a.id, scale_a.levels[1].id);
        choices.insert(scale_b.id, scale_b.levels[0].id);
        record(&question, &mut feed, &RawSubmission::MosChoices(choices)).unwrap();
        assert!(feed.is_complete());
    }

    #[test]
    fn failing_validator_blocks_the_new_response_and_keeps_the_old() {
        let mut question = mushra_question();
        question.validators = vec![ResponseValidator::MushraAnyAtLeast { threshold: 90 }];
        let mut feed = build_feed(&question, 44).unwrap();
        let n = match &feed {
            Feed::Mushra(f) => f.samples.len(),
            _ => unreachable!(),
        };

        let good: BTreeMap<usize, i64> = (0..n).map(|p| (p, if p == 0 { 95 } else { 30 })).collect();
        record(&question, &mut feed, &RawSubmission::Ratings(good.clone())).unwrap();
        assert!(feed.is_complete());

        // A flat sheet trips the validator; the stored sheet stays intact
        let flat: BTreeMap<usize, i64> = (0..n).map(|p| (p, 50)).collect();
        let err = record(&question, &mut feed, &RawSubmission::Ratings(flat));
        assert!(matches!(err, Err(Error::Validation(_))));

        let Feed::Mushra(f) = &feed else { unreachable!() };
        let stored: Vec<i64> = f.response.as_ref().unwrap().bits.iter().map(|b| b.value).collect();
        assert_eq!(stored, good.values().copied().collect::<Vec<_>>());
    }

    #[test]
    fn marker_feeds_take_no_responses() {
        let question = ab_question();
        let mut feed = Feed::End(crate::feed::EndFeed { id: Uuid::new_v4() });
        let err = record(&question, &mut feed, &RawSubmission::Choice("A".to_string()));
        assert!(matches!(err, Err(Error::InvalidSelection(_))));
    }
}
