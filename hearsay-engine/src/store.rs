//! SQLite persistence
//!
//! Save/load paths for survey trees, subjects with their page chains, and
//! responses. Every logical operation (one survey creation, one subject
//! allocation, one page flip, one recorded response) runs in a single
//! transaction, so a crash mid-operation cannot leave two current pages or
//! a feed without its page.

use crate::feed::{AbFeed, AbxFeed, EndFeed, Feed, MosFeed, MushraFeed, SectionFeed};
use crate::response::{
    AbResponse, AbxResponse, MosChoice, MosResponse, MushraResponse, MushraResponseBit,
};
use crate::subject::{PageNode, Subject};
use crate::survey::{
    Audio, AudioRole, MosLevel, MosScale, Question, QuestionKind, Section, Survey, System,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("bad uuid '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp '{s}': {e}")))
}

/// Whether a survey uid is already taken
pub async fn survey_uid_exists(pool: &SqlitePool, uid: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM surveys WHERE uid = ?")
        .bind(uid)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Persist a survey tree and its systems in one transaction
pub async fn save_survey(pool: &SqlitePool, survey: &Survey, systems: &[System]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for system in systems {
        sqlx::query("INSERT OR IGNORE INTO systems (id, description) VALUES (?, ?)")
            .bind(system.id.to_string())
            .bind(&system.description)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO surveys (id, uid, description, instruction, public, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(survey.id.to_string())
    .bind(&survey.uid)
    .bind(&survey.description)
    .bind(&survey.instruction)
    .bind(survey.public as i64)
    .bind(survey.created_at.to_rfc3339())
    .bind(survey.updated_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for (section_pos, section) in survey.sections.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sections (id, survey_id, position, description, instruction, is_end)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(section.id.to_string())
        .bind(survey.id.to_string())
        .bind(section_pos as i64)
        .bind(&section.description)
        .bind(&section.instruction)
        .bind(section.is_end as i64)
        .execute(&mut *tx)
        .await?;

        for (question_pos, question) in section.questions.iter().enumerate() {
            let (num_anchors, num_stimuli) = match &question.kind {
                QuestionKind::Mushra { num_anchors, num_stimuli } => {
                    (num_anchors.map(|n| n as i64), num_stimuli.map(|n| n as i64))
                }
                _ => (None, None),
            };
            sqlx::query(
                r#"
                INSERT INTO questions
                    (id, section_id, position, description, instruction, kind,
                     num_anchors, num_stimuli, validators)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(question.id.to_string())
            .bind(section.id.to_string())
            .bind(question_pos as i64)
            .bind(&question.description)
            .bind(&question.instruction)
            .bind(question.kind.species())
            .bind(num_anchors)
            .bind(num_stimuli)
            .bind(serde_json::to_string(&question.validators)?)
            .execute(&mut *tx)
            .await?;

            for (sample_pos, sample) in question.samples.iter().enumerate() {
                insert_audio(&mut tx, sample).await?;
                sqlx::query(
                    r#"
                    INSERT INTO question_samples (question_id, audio_id, position)
                    VALUES (?, ?, ?)
                    "#,
                )
                .bind(question.id.to_string())
                .bind(sample.id.to_string())
                .bind(sample_pos as i64)
                .execute(&mut *tx)
                .await?;
            }

            if let QuestionKind::Mos { scales } = &question.kind {
                for (scale_pos, scale) in scales.iter().enumerate() {
                    sqlx::query(
                        r#"
                        INSERT INTO mos_scales (id, question_id, position, description)
                        VALUES (?, ?, ?, ?)
                        "#,
                    )
                    .bind(scale.id.to_string())
                    .bind(question.id.to_string())
                    .bind(scale_pos as i64)
                    .bind(&scale.description)
                    .execute(&mut *tx)
                    .await?;

                    for (level_pos, level) in scale.levels.iter().enumerate() {
                        sqlx::query(
                            r#"
                            INSERT INTO mos_levels (id, scale_id, position, description, value)
                            VALUES (?, ?, ?, ?, ?)
                            "#,
                        )
                        .bind(level.id.to_string())
                        .bind(scale.id.to_string())
                        .bind(level_pos as i64)
                        .bind(&level.description)
                        .bind(level.value)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }
        }
    }

    tx.commit().await?;
    debug!(survey = %survey.id, uid = %survey.uid, "saved survey");
    Ok(())
}

/// Samples can be shared between questions; first insert wins
async fn insert_audio(tx: &mut Transaction<'_, Sqlite>, audio: &Audio) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO audios (id, description, system_id, media, role)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(audio.id.to_string())
    .bind(&audio.description)
    .bind(audio.system_id.to_string())
    .bind(&audio.media)
    .bind(audio.role.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Load a survey by its public uid
pub async fn load_survey_by_uid(pool: &SqlitePool, uid: &str) -> Result<Survey> {
    let id: Option<String> = sqlx::query_scalar("SELECT id FROM surveys WHERE uid = ?")
        .bind(uid)
        .fetch_optional(pool)
        .await?;
    let id = id.ok_or_else(|| Error::NotFound(format!("survey '{uid}'")))?;
    load_survey(pool, parse_uuid(&id)?).await
}

/// Load a full survey tree
pub async fn load_survey(pool: &SqlitePool, id: Uuid) -> Result<Survey> {
    let row: Option<(String, String, Option<String>, i64, String, String)> = sqlx::query_as(
        r#"
        SELECT uid, description, instruction, public, created_at, updated_at
        FROM surveys WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;
    let (uid, description, instruction, public, created_at, updated_at) =
        row.ok_or_else(|| Error::NotFound(format!("survey {id}")))?;

    let section_rows: Vec<(String, String, Option<String>, i64)> = sqlx::query_as(
        r#"
        SELECT id, description, instruction, is_end
        FROM sections WHERE survey_id = ? ORDER BY position
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let mut sections = Vec::with_capacity(section_rows.len());
    for (section_id, section_description, section_instruction, is_end) in section_rows {
        let section_id = parse_uuid(&section_id)?;
        let questions = load_questions(pool, section_id).await?;
        sections.push(Section {
            id: section_id,
            description: section_description,
            instruction: section_instruction,
            is_end: is_end != 0,
            questions,
        });
    }

    Ok(Survey {
        id,
        uid,
        description,
        instruction,
        public: public != 0,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        sections,
    })
}

async fn load_questions(pool: &SqlitePool, section_id: Uuid) -> Result<Vec<Question>> {
    let rows: Vec<(String, String, Option<String>, String, Option<i64>, Option<i64>, String)> =
        sqlx::query_as(
            r#"
            SELECT id, description, instruction, kind, num_anchors, num_stimuli, validators
            FROM questions WHERE section_id = ? ORDER BY position
            "#,
        )
        .bind(section_id.to_string())
        .fetch_all(pool)
        .await?;

    let mut questions = Vec::with_capacity(rows.len());
    for (question_id, description, instruction, kind, num_anchors, num_stimuli, validators) in rows
    {
        let question_id = parse_uuid(&question_id)?;
        let samples = load_question_samples(pool, question_id).await?;
        let kind = match kind.as_str() {
            "ab" => QuestionKind::Ab,
            "abx" => QuestionKind::Abx,
            "mushra" => QuestionKind::Mushra {
                num_anchors: num_anchors.map(|n| n as usize),
                num_stimuli: num_stimuli.map(|n| n as usize),
            },
            "mos" => QuestionKind::Mos { scales: load_scales(pool, question_id).await? },
            other => {
                return Err(Error::Internal(format!("unknown question kind: {other}")));
            }
        };
        questions.push(Question {
            id: question_id,
            description,
            instruction,
            samples,
            kind,
            validators: serde_json::from_str(&validators)?,
        });
    }
    Ok(questions)
}

fn audio_from_row(row: (String, String, String, String, String)) -> Result<Audio> {
    let (id, description, system_id, media, role) = row;
    Ok(Audio {
        id: parse_uuid(&id)?,
        description,
        system_id: parse_uuid(&system_id)?,
        media,
        role: AudioRole::parse(&role)?,
    })
}

async fn load_question_samples(pool: &SqlitePool, question_id: Uuid) -> Result<Vec<Audio>> {
    let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT a.id, a.description, a.system_id, a.media, a.role
        FROM question_samples qs
        JOIN audios a ON a.id = qs.audio_id
        WHERE qs.question_id = ?
        ORDER BY qs.position
        "#,
    )
    .bind(question_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(audio_from_row).collect()
}

async fn load_scales(pool: &SqlitePool, question_id: Uuid) -> Result<Vec<MosScale>> {
    let scale_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, description FROM mos_scales WHERE question_id = ? ORDER BY position",
    )
    .bind(question_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut scales = Vec::with_capacity(scale_rows.len());
    for (scale_id, description) in scale_rows {
        let scale_id = parse_uuid(&scale_id)?;
        let level_rows: Vec<(String, String, f64)> = sqlx::query_as(
            "SELECT id, description, value FROM mos_levels WHERE scale_id = ? ORDER BY position",
        )
        .bind(scale_id.to_string())
        .fetch_all(pool)
        .await?;
        let levels = level_rows
            .into_iter()
            .map(|(id, level_description, value)| {
                Ok(MosLevel { id: parse_uuid(&id)?, description: level_description, value })
            })
            .collect::<Result<Vec<_>>>()?;
        scales.push(MosScale { id: scale_id, description, levels });
    }
    Ok(scales)
}

/// Delete a survey; sections, questions, subjects, pages, feeds and
/// responses go with it through the foreign-key cascade
pub async fn delete_survey(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM surveys WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("survey {id}")));
    }
    debug!(survey = %id, "deleted survey");
    Ok(())
}

/// Persist a freshly allocated subject with its whole page chain in one
/// transaction (allocation is all-or-nothing per subject)
pub async fn save_subject(pool: &SqlitePool, subject: &Subject) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO subjects (id, survey_id, description) VALUES (?, ?, ?)")
        .bind(subject.id.to_string())
        .bind(subject.survey_id.to_string())
        .bind(&subject.description)
        .execute(&mut *tx)
        .await?;

    for (position, page) in subject.pages.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO pages (id, subject_id, position, is_current)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(page.id.to_string())
        .bind(subject.id.to_string())
        .bind(position as i64)
        .bind(page.is_current as i64)
        .execute(&mut *tx)
        .await?;

        insert_feed(&mut tx, page).await?;
    }

    tx.commit().await?;
    debug!(subject = %subject.id, pages = subject.pages.len(), "saved subject");
    Ok(())
}

async fn insert_feed(tx: &mut Transaction<'_, Sqlite>, page: &PageNode) -> Result<()> {
    let feed = &page.feed;
    let (section_id, question_id, seed, mos_sample_id) = match feed {
        Feed::Section(f) => (Some(f.section_id), None, None, None),
        Feed::End(_) => (None, None, None, None),
        Feed::Ab(f) => (None, Some(f.question_id), Some(f.seed), None),
        Feed::Abx(f) => (None, Some(f.question_id), Some(f.seed), None),
        Feed::Mushra(f) => (None, Some(f.question_id), Some(f.seed), None),
        Feed::Mos(f) => (None, Some(f.question_id), Some(f.seed), Some(f.sample.id)),
    };

    sqlx::query(
        r#"
        INSERT INTO feeds (id, page_id, species, section_id, question_id, seed, mos_sample_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(feed.id().to_string())
    .bind(page.id.to_string())
    .bind(feed.species())
    .bind(section_id.map(|u| u.to_string()))
    .bind(question_id.map(|u| u.to_string()))
    .bind(seed)
    .bind(mos_sample_id.map(|u| u.to_string()))
    .execute(&mut **tx)
    .await?;

    let samples: &[Audio] = match feed {
        Feed::Ab(f) => &f.samples,
        Feed::Abx(f) => &f.samples,
        Feed::Mushra(f) => &f.samples,
        Feed::Section(_) | Feed::Mos(_) | Feed::End(_) => &[],
    };
    for (position, sample) in samples.iter().enumerate() {
        sqlx::query(
            "INSERT INTO feed_samples (feed_id, audio_id, position) VALUES (?, ?, ?)",
        )
        .bind(feed.id().to_string())
        .bind(sample.id.to_string())
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }

    if feed.has_response() {
        insert_response(tx, feed).await?;
    }
    Ok(())
}

async fn insert_response(tx: &mut Transaction<'_, Sqlite>, feed: &Feed) -> Result<()> {
    let feed_id = feed.id().to_string();
    match feed {
        Feed::Section(_) | Feed::End(_) => Ok(()),
        Feed::Ab(AbFeed { response: Some(r), .. }) => {
            insert_response_row(
                tx,
                &feed_id,
                "ab",
                Some(r.value.id),
                r.started_at,
                r.ended_at,
            )
            .await
        }
        Feed::Abx(AbxFeed { response: Some(r), .. }) => {
            insert_response_row(
                tx,
                &feed_id,
                "abx",
                Some(r.value.id),
                r.started_at,
                r.ended_at,
            )
            .await
        }
        Feed::Mushra(MushraFeed { response: Some(r), .. }) => {
            insert_response_row(tx, &feed_id, "mushra", None, r.started_at, r.ended_at).await?;
            for bit in &r.bits {
                sqlx::query(
                    "INSERT INTO response_bits (feed_id, sample_id, value) VALUES (?, ?, ?)",
                )
                .bind(&feed_id)
                .bind(bit.sample_id.to_string())
                .bind(bit.value)
                .execute(&mut **tx)
                .await?;
            }
            Ok(())
        }
        Feed::Mos(MosFeed { response: Some(r), .. }) => {
            insert_response_row(tx, &feed_id, "mos", None, r.started_at, r.ended_at).await?;
            for choice in &r.choices {
                sqlx::query(
                    "INSERT INTO mos_choices (feed_id, scale_id, level_id) VALUES (?, ?, ?)",
                )
                .bind(&feed_id)
                .bind(choice.scale_id.to_string())
                .bind(choice.level_id.to_string())
                .execute(&mut **tx)
                .await?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn insert_response_row(
    tx: &mut Transaction<'_, Sqlite>,
    feed_id: &str,
    species: &str,
    value_audio_id: Option<Uuid>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO responses (feed_id, species, value_audio_id, started_at, ended_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(feed_id)
    .bind(species)
    .bind(value_audio_id.map(|u| u.to_string()))
    .bind(started_at.to_rfc3339())
    .bind(ended_at.map(|t| t.to_rfc3339()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Replace a feed's stored response (one response per feed; re-submission
/// overwrites) in one transaction
pub async fn save_response(pool: &SqlitePool, feed: &Feed) -> Result<()> {
    let mut tx = pool.begin().await?;

    // Bits and choices cascade from the response row
    sqlx::query("DELETE FROM responses WHERE feed_id = ?")
        .bind(feed.id().to_string())
        .execute(&mut *tx)
        .await?;
    insert_response(&mut tx, feed).await?;

    tx.commit().await?;
    debug!(feed = %feed.id(), "saved response");
    Ok(())
}

/// Flip the current-page pointer in one transaction, keeping the
/// single-current invariant under crashes
pub async fn set_current_page(pool: &SqlitePool, subject_id: Uuid, page_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE pages SET is_current = 0 WHERE subject_id = ?")
        .bind(subject_id.to_string())
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("UPDATE pages SET is_current = 1 WHERE id = ? AND subject_id = ?")
        .bind(page_id.to_string())
        .bind(subject_id.to_string())
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() != 1 {
        return Err(Error::NotFound(format!(
            "page {page_id} of subject {subject_id}"
        )));
    }

    tx.commit().await?;
    Ok(())
}

/// All subject ids allocated against a survey
pub async fn subject_ids_for_survey(pool: &SqlitePool, survey_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<String> = sqlx::query_scalar("SELECT id FROM subjects WHERE survey_id = ?")
        .bind(survey_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(|s| parse_uuid(s)).collect()
}

/// Rebuild a subject and its page chain from storage (resumable runs)
pub async fn load_subject(pool: &SqlitePool, id: Uuid) -> Result<Subject> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT survey_id, description FROM subjects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;
    let (survey_id, description) = row.ok_or_else(|| Error::NotFound(format!("subject {id}")))?;

    let page_rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT id, is_current FROM pages WHERE subject_id = ? ORDER BY position",
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?;

    let count = page_rows.len();
    let mut pages = Vec::with_capacity(count);
    for (index, (page_id, is_current)) in page_rows.into_iter().enumerate() {
        let page_id = parse_uuid(&page_id)?;
        let feed = load_feed(pool, page_id).await?;
        pages.push(PageNode {
            id: page_id,
            prev: index.checked_sub(1),
            next: if index + 1 < count { Some(index + 1) } else { None },
            is_current: is_current != 0,
            feed,
        });
    }

    let subject = Subject {
        id,
        survey_id: parse_uuid(&survey_id)?,
        description,
        pages,
    };
    subject.check_single_current()?;
    Ok(subject)
}

async fn load_feed(pool: &SqlitePool, page_id: Uuid) -> Result<Feed> {
    let row: Option<(String, String, Option<String>, Option<String>, Option<i64>, Option<String>)> =
        sqlx::query_as(
            r#"
            SELECT id, species, section_id, question_id, seed, mos_sample_id
            FROM feeds WHERE page_id = ?
            "#,
        )
        .bind(page_id.to_string())
        .fetch_optional(pool)
        .await?;
    let (feed_id, species, section_id, question_id, seed, mos_sample_id) =
        row.ok_or_else(|| Error::Internal(format!("page {page_id} has no feed")))?;
    let feed_id = parse_uuid(&feed_id)?;

    let feed = match species.as_str() {
        "section" => {
            let section_id = section_id
                .ok_or_else(|| Error::Internal(format!("section feed {feed_id} has no section")))?;
            Feed::Section(SectionFeed { id: feed_id, section_id: parse_uuid(&section_id)? })
        }
        "end" => Feed::End(EndFeed { id: feed_id }),
        "ab" | "abx" | "mushra" | "mos" => {
            let question_id = question_id.ok_or_else(|| {
                Error::Internal(format!("question feed {feed_id} has no question"))
            })?;
            let question_id = parse_uuid(&question_id)?;
            let seed = seed
                .ok_or_else(|| Error::Internal(format!("question feed {feed_id} has no seed")))?;
            load_question_feed(pool, feed_id, &species, question_id, seed, mos_sample_id).await?
        }
        other => return Err(Error::Internal(format!("unknown feed species: {other}"))),
    };
    Ok(feed)
}

async fn load_question_feed(
    pool: &SqlitePool,
    feed_id: Uuid,
    species: &str,
    question_id: Uuid,
    seed: i64,
    mos_sample_id: Option<String>,
) -> Result<Feed> {
    let samples = load_feed_samples(pool, feed_id).await?;

    let response_row: Option<(String, Option<String>, String, Option<String>)> = sqlx::query_as(
        "SELECT species, value_audio_id, started_at, ended_at FROM responses WHERE feed_id = ?",
    )
    .bind(feed_id.to_string())
    .fetch_optional(pool)
    .await?;

    let feed = match species {
        "ab" => Feed::Ab(AbFeed {
            id: feed_id,
            question_id,
            seed,
            samples,
            response: match response_row {
                Some(row) => {
                    let (value, started_at, ended_at) = load_choice_response(pool, row).await?;
                    Some(AbResponse { value, started_at, ended_at })
                }
                None => None,
            },
        }),
        "abx" => Feed::Abx(AbxFeed {
            id: feed_id,
            question_id,
            seed,
            samples,
            response: match response_row {
                Some(row) => {
                    let (value, started_at, ended_at) = load_choice_response(pool, row).await?;
                    Some(AbxResponse { value, started_at, ended_at })
                }
                None => None,
            },
        }),
        "mushra" => Feed::Mushra(MushraFeed {
            id: feed_id,
            question_id,
            seed,
            samples,
            response: match response_row {
                Some((_, _, started_at, ended_at)) => {
                    let bit_rows: Vec<(String, i64)> = sqlx::query_as(
                        "SELECT sample_id, value FROM response_bits WHERE feed_id = ?",
                    )
                    .bind(feed_id.to_string())
                    .fetch_all(pool)
                    .await?;
                    let bits = bit_rows
                        .into_iter()
                        .map(|(sample_id, value)| {
                            Ok(MushraResponseBit { sample_id: parse_uuid(&sample_id)?, value })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Some(MushraResponse {
                        bits,
                        started_at: parse_timestamp(&started_at)?,
                        ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
                    })
                }
                None => None,
            },
        }),
        "mos" => {
            let sample_id = mos_sample_id
                .ok_or_else(|| Error::Internal(format!("MOS feed {feed_id} has no sample")))?;
            let sample = load_audio(pool, parse_uuid(&sample_id)?).await?;
            let scale_ids = load_scale_ids(pool, question_id).await?;
            Feed::Mos(MosFeed {
                id: feed_id,
                question_id,
                seed,
                sample,
                scale_ids,
                response: match response_row {
                    Some((_, _, started_at, ended_at)) => {
                        let choice_rows: Vec<(String, String)> = sqlx::query_as(
                            "SELECT scale_id, level_id FROM mos_choices WHERE feed_id = ?",
                        )
                        .bind(feed_id.to_string())
                        .fetch_all(pool)
                        .await?;
                        let choices = choice_rows
                            .into_iter()
                            .map(|(scale_id, level_id)| {
                                Ok(MosChoice {
                                    scale_id: parse_uuid(&scale_id)?,
                                    level_id: parse_uuid(&level_id)?,
                                })
                            })
                            .collect::<Result<Vec<_>>>()?;
                        Some(MosResponse {
                            choices,
                            started_at: parse_timestamp(&started_at)?,
                            ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
                        })
                    }
                    None => None,
                },
            })
        }
        other => return Err(Error::Internal(format!("unknown question feed species: {other}"))),
    };
    Ok(feed)
}

async fn load_choice_response(
    pool: &SqlitePool,
    row: (String, Option<String>, String, Option<String>),
) -> Result<(Audio, DateTime<Utc>, Option<DateTime<Utc>>)> {
    let (_, value_audio_id, started_at, ended_at) = row;
    let value_audio_id = value_audio_id
        .ok_or_else(|| Error::Internal("choice response without a value".to_string()))?;
    let value = load_audio(pool, parse_uuid(&value_audio_id)?).await?;
    Ok((
        value,
        parse_timestamp(&started_at)?,
        ended_at.as_deref().map(parse_timestamp).transpose()?,
    ))
}

async fn load_feed_samples(pool: &SqlitePool, feed_id: Uuid) -> Result<Vec<Audio>> {
    let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT a.id, a.description, a.system_id, a.media, a.role
        FROM feed_samples fs
        JOIN audios a ON a.id = fs.audio_id
        WHERE fs.feed_id = ?
        ORDER BY fs.position
        "#,
    )
    .bind(feed_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(audio_from_row).collect()
}

async fn load_audio(pool: &SqlitePool, id: Uuid) -> Result<Audio> {
    let row: Option<(String, String, String, String, String)> = sqlx::query_as(
        "SELECT id, description, system_id, media, role FROM audios WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;
    audio_from_row(row.ok_or_else(|| Error::NotFound(format!("audio {id}")))?)
}

async fn load_scale_ids(pool: &SqlitePool, question_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM mos_scales WHERE question_id = ? ORDER BY position",
    )
    .bind(question_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(|s| parse_uuid(s)).collect()
}
