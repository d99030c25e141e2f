//! Core types and the scoring pipeline for RFP signal detection.
//!
//! Evidence flows through a pattern matcher, an additive confidence fold, a
//! reason analyzer, a temporal prior and a decision gate, and comes out as
//! an optional [`Opportunity`] plus the alerts announcing it.
//!
//! This crate is free of HTTP and database dependencies. Storage is reached
//! only through the traits in [`store`].

// Store traits return `impl Future + Send`; implementations use plain
// `async fn`.
#![allow(async_fn_in_trait)]

pub mod alert;
pub mod confidence;
pub mod config;
pub mod decision;
pub mod error;
pub mod evidence;
pub mod fit;
pub mod matcher;
pub mod opportunity;
pub mod pipeline;
pub mod reason;
pub mod rules;
pub mod signal;
pub mod store;
pub mod temporal;

pub use error::{Error, Result};
pub use opportunity::Opportunity;
pub use pipeline::{Evaluation, EvaluationRequest, Pipeline};
