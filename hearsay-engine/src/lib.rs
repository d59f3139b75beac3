//! # Hearsay Engine
//!
//! Core of the hearsay perceptual-survey system for subjective audio
//! evaluation (AB, ABX, MUSHRA and MOS listening tests):
//! - Survey definition input and the persisted survey model
//! - Seeded, reproducible stimulus assignment per subject
//! - Feed/page allocation into a linked, resumable page chain
//! - Traversal and completion tracking
//! - Response recording and validation
//!
//! The web layer, templating, authentication and media storage live
//! outside this crate; `SurveyService` is the boundary they talk to.

pub mod allocate;
pub mod assign;
pub mod definition;
pub mod error;
pub mod feed;
pub mod respond;
pub mod response;
pub mod service;
pub mod store;
pub mod subject;
pub mod survey;
pub mod validate;

pub use error::{Error, Result};
pub use feed::Feed;
pub use respond::RawSubmission;
pub use service::SurveyService;
pub use subject::Subject;
pub use survey::Survey;
