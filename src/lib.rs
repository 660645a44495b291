//! # dkim-verify
//!
//! HTTP service that proves DKIM-signed payment emails.
//!
//! An uploaded `.eml` artifact is staged, normalized, and handed to an
//! external SP1 toolchain. The prover's output is scanned for the payment
//! fields it prints, and the latest result is kept in a process-wide slot
//! that clients can poll.
//!
//! ## Pipeline
//!
//! ```text
//! POST /verify-dkim
//!        │
//!        ▼
//!   Intake ─► Normalize ─► Build ─► Prove ─► Extract
//!     │           │          │        │         │
//!     └───────────┴──── failure ──────┴─────────┘
//!                           │
//!                           ▼
//!                  single error response
//! ```
//!
//! The staged artifact is removed once the chain reaches a terminal state.

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod service;
pub mod store;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use event::{PipelineEvent, PipelineEventsChannel};
pub use pipeline::{
    CommandRunner, Pipeline, PipelineError, PipelineReport, TokioRunner, UploadedArtifact,
    VerificationResult, Verdict,
};
pub use service::{RunningService, ServiceBuilder};
pub use store::VerificationStore;
