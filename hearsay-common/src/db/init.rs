//! Database initialization
//!
//! Creates the SQLite database on first run and brings up the full schema.
//! All statements are idempotent (`CREATE TABLE IF NOT EXISTS`) so
//! initialization is safe to run on every startup.
//!
//! Deletion cascades along both ownership chains:
//! Survey → Section → Question → Feed → Response, and
//! Subject → Page → Feed → Response.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Options apply to every pooled connection: foreign keys must hold on
    // all of them or cascading deletes silently stop working.
    // WAL mode allows concurrent readers with one writer.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_systems_table(&pool).await?;
    create_audios_table(&pool).await?;
    create_surveys_table(&pool).await?;
    create_sections_table(&pool).await?;
    create_questions_table(&pool).await?;
    create_question_samples_table(&pool).await?;
    create_mos_scales_table(&pool).await?;
    create_mos_levels_table(&pool).await?;
    create_subjects_table(&pool).await?;
    create_pages_table(&pool).await?;
    create_feeds_table(&pool).await?;
    create_feed_samples_table(&pool).await?;
    create_responses_table(&pool).await?;
    create_response_bits_table(&pool).await?;
    create_mos_choices_table(&pool).await?;

    Ok(pool)
}

async fn create_systems_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS systems (
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_audios_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audios (
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            system_id TEXT NOT NULL REFERENCES systems(id) ON DELETE CASCADE,
            media TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'stimulus'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_surveys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys (
            id TEXT PRIMARY KEY,
            uid TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            instruction TEXT,
            public INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id TEXT PRIMARY KEY,
            survey_id TEXT NOT NULL REFERENCES surveys(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            description TEXT NOT NULL,
            instruction TEXT,
            is_end INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_questions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            description TEXT NOT NULL,
            instruction TEXT,
            kind TEXT NOT NULL,
            num_anchors INTEGER,
            num_stimuli INTEGER,
            validators TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_question_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_samples (
            question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
            audio_id TEXT NOT NULL REFERENCES audios(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (question_id, audio_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_mos_scales_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mos_scales (
            id TEXT PRIMARY KEY,
            question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_mos_levels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mos_levels (
            id TEXT PRIMARY KEY,
            scale_id TEXT NOT NULL REFERENCES mos_scales(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            description TEXT NOT NULL,
            value REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_subjects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subjects (
            id TEXT PRIMARY KEY,
            survey_id TEXT NOT NULL REFERENCES surveys(id) ON DELETE CASCADE,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_subject ON pages(subject_id, position)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_feeds_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feeds (
            id TEXT PRIMARY KEY,
            page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
            species TEXT NOT NULL,
            section_id TEXT REFERENCES sections(id) ON DELETE CASCADE,
            question_id TEXT REFERENCES questions(id) ON DELETE CASCADE,
            seed INTEGER,
            mos_sample_id TEXT REFERENCES audios(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_feeds_page ON feeds(page_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_feed_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feed_samples (
            feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
            audio_id TEXT NOT NULL REFERENCES audios(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            PRIMARY KEY (feed_id, audio_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            feed_id TEXT PRIMARY KEY REFERENCES feeds(id) ON DELETE CASCADE,
            species TEXT NOT NULL,
            value_audio_id TEXT REFERENCES audios(id),
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_response_bits_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS response_bits (
            feed_id TEXT NOT NULL REFERENCES responses(feed_id) ON DELETE CASCADE,
            sample_id TEXT NOT NULL REFERENCES audios(id) ON DELETE CASCADE,
            value INTEGER NOT NULL,
            PRIMARY KEY (feed_id, sample_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_mos_choices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mos_choices (
            feed_id TEXT NOT NULL REFERENCES responses(feed_id) ON DELETE CASCADE,
            scale_id TEXT NOT NULL REFERENCES mos_scales(id) ON DELETE CASCADE,
            level_id TEXT NOT NULL REFERENCES mos_levels(id) ON DELETE CASCADE,
            PRIMARY KEY (feed_id, scale_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
