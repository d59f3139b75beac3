//! Survey service facade
//!
//! The boundary handed to the request-handling layer: survey creation from
//! a definition tree, per-subject allocation, traversal, and response
//! recording. The service owns the connection pool and an in-memory cache
//! of live subjects; every mutating operation writes the database first and
//! the cache second, under the write lock, so concurrent requests against
//! one subject serialize instead of corrupting the single-current-page
//! invariant.

use crate::allocate;
use crate::definition::{
    AudioDef, AudioRoleDef, QuestionKindDef, SectionDef, SurveyDef,
};
use crate::feed::Feed;
use crate::respond::{self, RawSubmission};
use crate::store;
use crate::subject::Subject;
use crate::survey::{
    Audio, AudioRole, MosLevel, MosScale, Question, QuestionKind, Section, Survey, System,
};
use crate::{Error, Result};
use chrono::Utc;
use hearsay_common::uid::new_survey_uid;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Engine facade over one database
#[derive(Clone)]
pub struct SurveyService {
    db: SqlitePool,
    surveys: Arc<RwLock<HashMap<Uuid, Survey>>>,
    uid_index: Arc<RwLock<HashMap<String, Uuid>>>,
    subjects: Arc<RwLock<HashMap<Uuid, Subject>>>,
}

impl SurveyService {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            surveys: Arc::new(RwLock::new(HashMap::new())),
            uid_index: Arc::new(RwLock::new(HashMap::new())),
            subjects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate a definition tree, assign identifiers, persist it, and
    /// return the realized survey
    pub async fn create_survey(&self, def: &SurveyDef) -> Result<Survey> {
        def.validate()?;

        // Short uids collide eventually; regenerate until free
        let mut uid = new_survey_uid();
        while store::survey_uid_exists(&self.db, &uid).await? {
            debug!(uid = %uid, "survey uid collision, regenerating");
            uid = new_survey_uid();
        }

        let (survey, systems) = realize_survey(def, uid);
        store::save_survey(&self.db, &survey, &systems).await?;

        self.uid_index.write().await.insert(survey.uid.clone(), survey.id);
        self.surveys.write().await.insert(survey.id, survey.clone());

        info!(
            survey = %survey.id,
            uid = %survey.uid,
            sections = survey.sections.len(),
            questions = survey.num_questions(),
            "created survey"
        );
        Ok(survey)
    }

    /// Look up a survey by its public uid
    pub async fn survey(&self, uid: &str) -> Result<Survey> {
        if let Some(id) = self.uid_index.read().await.get(uid) {
            if let Some(survey) = self.surveys.read().await.get(id) {
                return Ok(survey.clone());
            }
        }
        let survey = store::load_survey_by_uid(&self.db, uid).await?;
        self.uid_index.write().await.insert(survey.uid.clone(), survey.id);
        self.surveys.write().await.insert(survey.id, survey.clone());
        Ok(survey)
    }

    async fn survey_by_id(&self, id: Uuid) -> Result<Survey> {
        if let Some(survey) = self.surveys.read().await.get(&id) {
            return Ok(survey.clone());
        }
        let survey = store::load_survey(&self.db, id).await?;
        self.uid_index.write().await.insert(survey.uid.clone(), survey.id);
        self.surveys.write().await.insert(survey.id, survey.clone());
        Ok(survey)
    }

    /// Allocate a new subject's page chain for a survey.
    ///
    /// Persisted in a single transaction: either the subject exists with
    /// its whole chain, or not at all.
    pub async fn allocate(&self, survey_uid: &str, subject_description: &str) -> Result<Uuid> {
        let survey = self.survey(survey_uid).await?;
        let subject = allocate::allocate(&survey, subject_description)?;
        store::save_subject(&self.db, &subject).await?;

        let subject_id = subject.id;
        self.subjects.write().await.insert(subject_id, subject);
        info!(subject = %subject_id, survey = %survey.uid, "allocated subject");
        Ok(subject_id)
    }

    /// Load a subject into the cache if it is not there yet (resume after
    /// restart), then hand back a snapshot
    pub async fn subject(&self, subject_id: Uuid) -> Result<Subject> {
        let mut subjects = self.subjects.write().await;
        if let Some(subject) = subjects.get(&subject_id) {
            return Ok(subject.clone());
        }
        let subject = store::load_subject(&self.db, subject_id).await?;
        subjects.insert(subject_id, subject.clone());
        Ok(subject)
    }

    /// The feed on the subject's current page
    pub async fn current_feed(&self, subject_id: Uuid) -> Result<Feed> {
        let subject = self.subject(subject_id).await?;
        Ok(subject.current_feed()?.clone())
    }

    /// Move the subject one page forward; soft no-op at the chain end
    pub async fn advance(&self, subject_id: Uuid) -> Result<()> {
        self.flip(subject_id, Direction::Forward).await
    }

    /// Move the subject one page back; soft no-op at the chain start
    pub async fn retreat(&self, subject_id: Uuid) -> Result<()> {
        self.flip(subject_id, Direction::Backward).await
    }

    async fn flip(&self, subject_id: Uuid, direction: Direction) -> Result<()> {
        let mut subjects = self.subjects.write().await;
        if !subjects.contains_key(&subject_id) {
            let loaded = store::load_subject(&self.db, subject_id).await?;
            subjects.insert(subject_id, loaded);
        }
        let subject = subjects
            .get_mut(&subject_id)
            .ok_or_else(|| Error::NotFound(format!("subject {subject_id}")))?;

        let current = subject
            .current_index()
            .ok_or_else(|| Error::Internal(format!("subject {subject_id} has no current page")))?;
        let target = match direction {
            Direction::Forward => subject.pages[current].next,
            Direction::Backward => subject.pages[current].prev,
        };
        let Some(target) = target else {
            return Ok(());
        };

        // Database first, then cache
        store::set_current_page(&self.db, subject_id, subject.pages[target].id).await?;
        subject.pages[current].is_current = false;
        subject.pages[target].is_current = true;
        debug!(subject = %subject_id, page = %subject.pages[target].id, "flipped page");
        Ok(())
    }

    /// Decode, validate, persist and attach one submission
    pub async fn record(
        &self,
        subject_id: Uuid,
        feed_id: Uuid,
        raw: &RawSubmission,
    ) -> Result<()> {
        let mut subjects = self.subjects.write().await;
        if !subjects.contains_key(&subject_id) {
            let loaded = store::load_subject(&self.db, subject_id).await?;
            subjects.insert(subject_id, loaded);
        }
        let subject = subjects
            .get_mut(&subject_id)
            .ok_or_else(|| Error::NotFound(format!("subject {subject_id}")))?;

        let feed = subject
            .feed(feed_id)
            .ok_or_else(|| Error::NotFound(format!("feed {feed_id}")))?;
        let question_id = feed.question_id().ok_or_else(|| {
            Error::InvalidSelection("marker pages do not take responses".to_string())
        })?;

        let survey = self.survey_by_id(subject.survey_id).await?;
        let question = survey
            .question(question_id)
            .ok_or_else(|| Error::NotFound(format!("question {question_id}")))?;

        // Stage on a copy; the cache only changes after the write commits
        let mut staged = feed.clone();
        respond::record(question, &mut staged, raw)?;
        store::save_response(&self.db, &staged).await?;

        let slot = subject
            .feed_mut(feed_id)
            .ok_or_else(|| Error::NotFound(format!("feed {feed_id}")))?;
        *slot = staged;
        Ok(())
    }

    /// True once every page of the subject's chain is complete
    pub async fn is_subject_complete(&self, subject_id: Uuid) -> Result<bool> {
        let subject = self.subject(subject_id).await?;
        Ok(subject.is_complete())
    }

    /// Number of subjects allocated against a survey
    pub async fn num_subjects(&self, survey_uid: &str) -> Result<usize> {
        let survey = self.survey(survey_uid).await?;
        Ok(store::subject_ids_for_survey(&self.db, survey.id).await?.len())
    }

    /// Number of subjects that have finished the survey
    pub async fn num_complete(&self, survey_uid: &str) -> Result<usize> {
        let survey = self.survey(survey_uid).await?;
        let ids = store::subject_ids_for_survey(&self.db, survey.id).await?;
        let mut complete = 0;
        for id in ids {
            if self.subject(id).await?.is_complete() {
                complete += 1;
            }
        }
        Ok(complete)
    }

    pub async fn num_incomplete(&self, survey_uid: &str) -> Result<usize> {
        Ok(self.num_subjects(survey_uid).await? - self.num_complete(survey_uid).await?)
    }

    /// Drop a survey and everything hanging off it (cascading delete)
    pub async fn delete_survey(&self, survey_uid: &str) -> Result<()> {
        let survey = self.survey(survey_uid).await?;
        store::delete_survey(&self.db, survey.id).await?;

        self.uid_index.write().await.remove(&survey.uid);
        self.surveys.write().await.remove(&survey.id);
        self.subjects
            .write()
            .await
            .retain(|_, subject| subject.survey_id != survey.id);
        info!(survey = %survey.id, uid = %survey.uid, "deleted survey");
        Ok(())
    }
}

enum Direction {
    Forward,
    Backward,
}

/// Turn a validated definition tree into the persisted model, assigning
/// ids and interning systems and samples shared between questions
fn realize_survey(def: &SurveyDef, uid: String) -> (Survey, Vec<System>) {
    let mut systems: HashMap<String, System> = HashMap::new();
    let mut audios: HashMap<AudioDef, Audio> = HashMap::new();

    let sections = def.sections.iter().map(|s| realize_section(s, &mut systems, &mut audios)).collect();

    let now = Utc::now();
    let survey = Survey {
        id: Uuid::new_v4(),
        uid,
        description: def.description.clone(),
        instruction: def.instruction.clone(),
        public: def.public,
        created_at: now,
        updated_at: now,
        sections,
    };
    (survey, systems.into_values().collect())
}

fn realize_section(
    def: &SectionDef,
    systems: &mut HashMap<String, System>,
    audios: &mut HashMap<AudioDef, Audio>,
) -> Section {
    Section {
        id: Uuid::new_v4(),
        description: def.description.clone(),
        instruction: def.instruction.clone(),
        is_end: def.is_end,
        questions: def
            .questions
            .iter()
            .map(|q| realize_question(q, systems, audios))
            .collect(),
    }
}

fn realize_question(
    def: &crate::definition::QuestionDef,
    systems: &mut HashMap<String, System>,
    audios: &mut HashMap<AudioDef, Audio>,
) -> Question {
    let samples = def
        .samples
        .iter()
        .map(|sample| realize_audio(sample, systems, audios))
        .collect();

    let kind = match &def.kind {
        QuestionKindDef::Ab => QuestionKind::Ab,
        QuestionKindDef::Abx => QuestionKind::Abx,
        QuestionKindDef::Mushra { num_anchors, num_stimuli } => QuestionKind::Mushra {
            num_anchors: *num_anchors,
            num_stimuli: *num_stimuli,
        },
        QuestionKindDef::Mos { scales } => QuestionKind::Mos {
            scales: scales
                .iter()
                .map(|scale| MosScale {
                    id: Uuid::new_v4(),
                    description: scale.description.clone(),
                    levels: scale
                        .levels
                        .iter()
                        .map(|level| MosLevel {
                            id: Uuid::new_v4(),
                            description: level.description.clone(),
                            value: level.value,
                        })
                        .collect(),
                })
                .collect(),
        },
    };

    Question {
        id: Uuid::new_v4(),
        description: def.description.clone(),
        instruction: def.instruction.clone(),
        samples,
        kind,
        validators: def.validators.clone(),
    }
}

fn realize_audio(
    def: &AudioDef,
    systems: &mut HashMap<String, System>,
    audios: &mut HashMap<AudioDef, Audio>,
) -> Audio {
    if let Some(existing) = audios.get(def) {
        return existing.clone();
    }
    let system = systems
        .entry(def.system.description.clone())
        .or_insert_with(|| System {
            id: Uuid::new_v4(),
            description: def.system.description.clone(),
        });
    let audio = Audio {
        id: Uuid::new_v4(),
        description: def.description.clone(),
        system_id: system.id,
        media: def.media.clone(),
        role: match def.role {
            AudioRoleDef::Reference => AudioRole::Reference,
            AudioRoleDef::Anchor => AudioRole::Anchor,
            AudioRoleDef::Stimulus => AudioRole::Stimulus,
        },
    };
    audios.insert(def.clone(), audio.clone());
    audio
}
