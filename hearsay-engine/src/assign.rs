//! Randomized assignment functions
//!
//! Pure functions mapping (question, seed) to a concrete labeled sample
//! arrangement for one subject. All draws for one feed come from a single
//! ChaCha8 generator keyed by the feed's stored seed, advanced through a
//! fixed draw sequence (partial Fisher–Yates for subset draws, full
//! Fisher–Yates for the MUSHRA shuffle, one bounded draw for single picks).
//! Re-seeding with the same value replays the identical sequence, so the
//! mapping shown to the subject and the mapping used to decode a submitted
//! answer are always the same one.

use crate::survey::{Audio, Question};
use crate::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generator for one feed, keyed by its stored seed.
///
/// The i64 → u64 cast is bijective, so the full signed seed range stays
/// usable.
pub fn feed_rng(seed: i64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed as u64)
}

/// Draw `n` items without replacement (partial Fisher–Yates over indices)
fn draw<T: Clone>(pool: &[T], n: usize, rng: &mut ChaCha8Rng) -> Vec<T> {
    debug_assert!(n <= pool.len());
    let mut indices: Vec<usize> = (0..pool.len()).collect();
    let mut out = Vec::with_capacity(n);
    for k in 0..n {
        let j = rng.gen_range(k..indices.len());
        indices.swap(k, j);
        out.push(pool[indices[k]].clone());
    }
    out
}

/// Uniform single draw with replacement
fn pick<'a, T>(pool: &'a [T], rng: &mut ChaCha8Rng) -> &'a T {
    &pool[rng.gen_range(0..pool.len())]
}

/// In-place Fisher–Yates shuffle
fn shuffle<T>(items: &mut [T], rng: &mut ChaCha8Rng) {
    for k in (1..items.len()).rev() {
        let j = rng.gen_range(0..=k);
        items.swap(k, j);
    }
}

/// AB arrangement: which sample hides behind each label
#[derive(Debug, Clone, PartialEq)]
pub struct AbAssignment {
    pub a: Audio,
    pub b: Audio,
}

impl AbAssignment {
    pub fn get(&self, label: &str) -> Option<&Audio> {
        match label {
            "A" => Some(&self.a),
            "B" => Some(&self.b),
            _ => None,
        }
    }

    /// Presentation order: label, sample
    pub fn choices(&self) -> [(&'static str, &Audio); 2] {
        [("A", &self.a), ("B", &self.b)]
    }
}

/// ABX arrangement: A/B plus the reference-identification stimulus X
#[derive(Debug, Clone, PartialEq)]
pub struct AbxAssignment {
    pub a: Audio,
    pub b: Audio,
    pub x: Audio,
}

impl AbxAssignment {
    pub fn get(&self, label: &str) -> Option<&Audio> {
        match label {
            "A" => Some(&self.a),
            "B" => Some(&self.b),
            "X" => Some(&self.x),
            _ => None,
        }
    }

    /// Labels a subject may submit as an answer (X is the probe, not a choice)
    pub fn answer(&self, label: &str) -> Option<&Audio> {
        match label {
            "A" => Some(&self.a),
            "B" => Some(&self.b),
            _ => None,
        }
    }
}

/// MUSHRA arrangement: presented samples by ordinal position
#[derive(Debug, Clone, PartialEq)]
pub struct MushraAssignment {
    pub order: Vec<Audio>,
}

impl MushraAssignment {
    pub fn get(&self, position: usize) -> Option<&Audio> {
        self.order.get(position)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// MOS arrangement: the one fixed sample for this feed
#[derive(Debug, Clone, PartialEq)]
pub struct MosAssignment {
    pub sample: Audio,
}

/// AB: draw two distinct samples; labels "A","B" in draw order
pub fn ab_assignment(question: &Question, seed: i64) -> Result<AbAssignment> {
    if question.samples.len() != 2 {
        return Err(Error::Config(format!(
            "AB question '{}' needs exactly two samples to compare, has {}",
            question.description,
            question.samples.len()
        )));
    }
    let mut rng = feed_rng(seed);
    let mut drawn = draw(&question.samples, 2, &mut rng).into_iter();
    let (Some(a), Some(b)) = (drawn.next(), drawn.next()) else {
        return Err(Error::Internal("two-sample draw came up short".to_string()));
    };
    Ok(AbAssignment { a, b })
}

/// ABX: the AB draw, then X drawn with replacement from the full set,
/// continuing the same generator sequence
pub fn abx_assignment(question: &Question, seed: i64) -> Result<AbxAssignment> {
    if question.samples.len() != 2 {
        return Err(Error::Config(format!(
            "ABX question '{}' needs exactly two samples to compare, has {}",
            question.description,
            question.samples.len()
        )));
    }
    let mut rng = feed_rng(seed);
    let mut drawn = draw(&question.samples, 2, &mut rng).into_iter();
    let x = pick(&question.samples, &mut rng).clone();
    let (Some(a), Some(b)) = (drawn.next(), drawn.next()) else {
        return Err(Error::Internal("two-sample draw came up short".to_string()));
    };
    Ok(AbxAssignment { a, b, x })
}

/// MUSHRA: one reference, an anchor subset, a stimulus subset, one shuffle
/// over the combined selection; labels are ordinal positions
pub fn mushra_assignment(
    question: &Question,
    num_anchors: Option<usize>,
    num_stimuli: Option<usize>,
    seed: i64,
) -> Result<MushraAssignment> {
    let references: Vec<Audio> = question.references().cloned().collect();
    let anchors: Vec<Audio> = question.anchors().cloned().collect();
    let stimuli: Vec<Audio> = question.stimuli().cloned().collect();

    if references.len() != 1 {
        return Err(Error::Config(format!(
            "MUSHRA question '{}' needs exactly one reference, has {}",
            question.description,
            references.len()
        )));
    }

    let n_anchors = num_anchors.unwrap_or(anchors.len());
    if n_anchors < 1 {
        return Err(Error::Config(format!(
            "MUSHRA question '{}' needs at least one anchor",
            question.description
        )));
    }
    if n_anchors > anchors.len() {
        return Err(Error::Config(format!(
            "MUSHRA question '{}' asks for {} anchors but only {} are available",
            question.description,
            n_anchors,
            anchors.len()
        )));
    }

    let n_stimuli = num_stimuli.unwrap_or(stimuli.len());
    if n_stimuli > stimuli.len() {
        return Err(Error::Config(format!(
            "MUSHRA question '{}' asks for {} stimuli but only {} are available",
            question.description,
            n_stimuli,
            stimuli.len()
        )));
    }

    let mut rng = feed_rng(seed);
    let mut order = Vec::with_capacity(1 + n_anchors + n_stimuli);
    order.extend(references);
    order.extend(draw(&anchors, n_anchors, &mut rng));
    order.extend(draw(&stimuli, n_stimuli, &mut rng));
    shuffle(&mut order, &mut rng);

    Ok(MushraAssignment { order })
}

/// MOS: one fixed sample per feed, drawn once from the candidate set
pub fn mos_assignment(question: &Question, seed: i64) -> Result<MosAssignment> {
    if question.samples.is_empty() {
        return Err(Error::Config(format!(
            "MOS question '{}' has no samples",
            question.description
        )));
    }
    let mut rng = feed_rng(seed);
    Ok(MosAssignment {
        sample: pick(&question.samples, &mut rng).clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::{AudioRole, QuestionKind};
    use uuid::Uuid;

    fn audio(description: &str, role: AudioRole) -> Audio {
        Audio {
            id: Uuid::new_v4(),
            description: description.to_string(),
            system_id: Uuid::new_v4(),
            media: format!("{description}.wav"),
            role,
        }
    }

    fn ab_question(n: usize) -> Question {
        Question {
            id: Uuid::new_v4(),
            description: "ab".to_string(),
            instruction: None,
            samples: (0..n)
                .map(|i| audio(&format!("s{i}"), AudioRole::Stimulus))
                .collect(),
            kind: QuestionKind::Ab,
            validators: vec![],
        }
    }

    fn mushra_question(n_anchors: usize, n_stimuli: usize) -> Question {
        let mut samples = vec![audio("ref", AudioRole::Reference)];
        for i in 0..n_anchors {
            samples.push(audio(&format!("anchor{i}"), AudioRole::Anchor));
        }
        for i in 0..n_stimuli {
            samples.push(audio(&format!("stim{i}"), AudioRole::Stimulus));
        }
        Question {
            id: Uuid::new_v4(),
            description: "mushra".to_string(),
            instruction: None,
            samples,
            kind: QuestionKind::Mushra { num_anchors: None, num_stimuli: None },
            validators: vec![],
        }
    }

    #[test]
    fn ab_is_deterministic_per_seed() {
        let question = ab_question(2);
        for seed in [0i64, 1, -1, i64::MAX, i64::MIN, 424242] {
            let first = ab_assignment(&question, seed).unwrap();
            let second = ab_assignment(&question, seed).unwrap();
            assert_eq!(first, second, "seed {seed} not reproducible");
        }
    }

    #[test]
    fn ab_labels_map_to_distinct_samples() {
        let question = ab_question(2);
        for seed in 0..64i64 {
            let assignment = ab_assignment(&question, seed).unwrap();
            assert_ne!(assignment.a.id, assignment.b.id);
            assert!(question.sample(assignment.a.id).is_some());
            assert!(question.sample(assignment.b.id).is_some());
        }
    }

    #[test]
    fn ab_order_varies_with_seed() {
        let question = ab_question(2);
        let mut orders = std::collections::HashSet::new();
        for seed in 0..64i64 {
            let assignment = ab_assignment(&question, seed).unwrap();
            orders.insert(assignment.a.id);
        }
        // Both samples show up as "A" across seeds
        assert_eq!(orders.len(), 2);
    }

    #[test]
    fn ab_requires_exactly_two_samples() {
        assert!(matches!(ab_assignment(&ab_question(1), 0), Err(Error::Config(_))));
        assert!(matches!(ab_assignment(&ab_question(3), 0), Err(Error::Config(_))));
    }

    #[test]
    fn abx_x_comes_from_the_sample_set() {
        let question = ab_question(2);
        for seed in 0..64i64 {
            let assignment = abx_assignment(&question, seed).unwrap();
            assert_ne!(assignment.a.id, assignment.b.id);
            assert!(question.sample(assignment.x.id).is_some());
            // X is the probe, not an answer option
            assert!(assignment.answer("X").is_none());
            assert!(assignment.get("X").is_some());
        }
    }

    #[test]
    fn abx_extends_the_ab_sequence_without_reseeding() {
        let question = ab_question(2);
        for seed in 0..32i64 {
            let ab = ab_assignment(&question, seed).unwrap();
            let abx = abx_assignment(&question, seed).unwrap();
            // Same generator prefix: the AB part of ABX matches plain AB
            assert_eq!(ab.a, abx.a);
            assert_eq!(ab.b, abx.b);
        }
    }

    #[test]
    fn mushra_includes_reference_exactly_once() {
        let question = mushra_question(2, 3);
        for seed in 0..32i64 {
            let assignment = mushra_assignment(&question, None, None, seed).unwrap();
            let n_refs = assignment
                .order
                .iter()
                .filter(|s| s.role == AudioRole::Reference)
                .count();
            assert_eq!(n_refs, 1);
            assert_eq!(assignment.len(), 6);
        }
    }

    #[test]
    fn mushra_respects_caps() {
        let question = mushra_question(3, 4);
        let assignment = mushra_assignment(&question, Some(1), Some(2), 9).unwrap();
        assert_eq!(assignment.len(), 4);
        assert_eq!(
            assignment.order.iter().filter(|s| s.role == AudioRole::Anchor).count(),
            1
        );
        assert_eq!(
            assignment.order.iter().filter(|s| s.role == AudioRole::Stimulus).count(),
            2
        );
    }

    #[test]
    fn mushra_cap_above_pool_is_a_config_error() {
        let question = mushra_question(1, 2);
        assert!(matches!(
            mushra_assignment(&question, Some(2), None, 0),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            mushra_assignment(&question, None, Some(5), 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn mushra_requires_one_reference_and_an_anchor() {
        let mut no_ref = mushra_question(1, 1);
        no_ref.samples.retain(|s| s.role != AudioRole::Reference);
        assert!(matches!(
            mushra_assignment(&no_ref, None, None, 0),
            Err(Error::Config(_))
        ));

        let mut two_refs = mushra_question(1, 1);
        two_refs.samples.push(audio("ref2", AudioRole::Reference));
        assert!(matches!(
            mushra_assignment(&two_refs, None, None, 0),
            Err(Error::Config(_))
        ));

        let no_anchor = mushra_question(0, 2);
        assert!(matches!(
            mushra_assignment(&no_anchor, None, None, 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn mushra_is_deterministic_per_seed() {
        let question = mushra_question(2, 4);
        for seed in [-7i64, 0, 12345] {
            let first = mushra_assignment(&question, Some(1), Some(2), seed).unwrap();
            let second = mushra_assignment(&question, Some(1), Some(2), seed).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn mos_sample_belongs_to_the_question() {
        let question = ab_question(4);
        for seed in 0..32i64 {
            let assignment = mos_assignment(&question, seed).unwrap();
            assert!(question.sample(assignment.sample.id).is_some());
            let again = mos_assignment(&question, seed).unwrap();
            assert_eq!(assignment, again);
        }
    }
}
