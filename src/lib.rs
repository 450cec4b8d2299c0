//! # Delvegraph: Graph-driven Research Workflow Engine
//!
//! Delvegraph runs multi-stage research pipelines as concurrent workflow
//! graphs with deterministic barrier merges, dynamic fan-out over planned
//! sub-topics, and bounded revision and search loops.
//!
//! ## Core Concepts
//!
//! - **Stages**: Async units of work that read a state snapshot and emit an update
//! - **State**: Typed research fields merged through per-field reducers
//! - **Graph**: Declarative workflow definition with routers and fan-out planners
//! - **Runner**: Concurrent execution with an ordinal-keyed join barrier
//! - **Capabilities**: The generation service and record store stages work against
//!
//! ## Quick Start
//!
//! ### Working with Messages
//!
//! Messages record the conversational frame of a run. Use convenience
//! constructors:
//!
//! ```
//! use delvegraph::message::Message;
//!
//! // Preferred: Use convenience constructors
//! let user_msg = Message::user("How do coral reefs form?");
//! let assistant_msg = Message::assistant("Reefs grow from coral polyp skeletons.");
//! let system_msg = Message::system("You are a research assistant.");
//!
//! // For custom roles, use the general constructor
//! let tool_msg = Message::new("tool", "search complete");
//!
//! // Use role constants for consistency
//! let user_msg2 = Message::new(Message::USER, "Another question");
//!
//! // Check message roles
//! assert!(user_msg.has_role(Message::USER));
//! assert!(!user_msg.has_role(Message::ASSISTANT));
//! ```
//!
//! ### Defining a Stage
//!
//! ```
//! use async_trait::async_trait;
//! use delvegraph::stage::{Stage, StageContext, StageError, StageUpdate};
//! use delvegraph::state::StateSnapshot;
//!
//! struct Digest;
//!
//! #[async_trait]
//! impl Stage for Digest {
//!     async fn run(
//!         &self,
//!         snapshot: StateSnapshot,
//!         _ctx: StageContext,
//!     ) -> Result<StageUpdate, StageError> {
//!         let draft = format!("digest of {} research blocks", snapshot.findings.len());
//!         Ok(StageUpdate::default().with_draft(draft))
//!     }
//! }
//! ```
//!
//! ### State Management
//!
//! ```
//! use chrono::Utc;
//! use delvegraph::state::{Phase, WorkflowState};
//!
//! // Create initial state from the user's question
//! let state = WorkflowState::new_with_query("What causes auroras?");
//!
//! // Or use the builder pattern for more control
//! let staged = WorkflowState::builder()
//!     .with_query("What causes auroras?")
//!     .with_phase(Phase::Researching)
//!     .with_started_at(Utc::now())
//!     .build();
//! assert_eq!(staged.phase, Phase::Researching);
//! ```
//!
//! ### Running a Shipped Pipeline
//!
//! The [`api`] module wires a preset graph, a runner, and the record store
//! into one call:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use delvegraph::api::{submit, RunRequest};
//! use delvegraph::records::InMemoryRecordStore;
//! use delvegraph::stage::Capabilities;
//! use delvegraph::utils::testing;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let caps = Capabilities::new(
//!     testing::text_service("a short reef digest"),
//!     Arc::new(InMemoryRecordStore::new()),
//! );
//! let outcome = submit(RunRequest::new("How do coral reefs form?"), caps).await?;
//! println!("{}", outcome.report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Stages surface fatal trouble through rich diagnostic error types; routine
//! collaborator failures degrade to fallback values instead:
//!
//! ```
//! use delvegraph::stage::{StageContext, StageError};
//!
//! fn check_inputs(ctx: &StageContext) -> Result<(), StageError> {
//!     ctx.emit("validation", "checking run inputs")?;
//!
//!     // Fatal: the stage ran before its input field was written
//!     Err(StageError::MissingInput { what: "user query" })
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`message`] - Message types and construction utilities
//! - [`state`] - Research state, snapshots, and the builder
//! - [`stage`] - Stage trait, context, and update payloads
//! - [`graph`] - Workflow graph definition and compilation
//! - [`workflow`] - Compiled workflows and the reducer registry binding
//! - [`reducers`] - Per-field merge strategies
//! - [`runtime`] - The runner, task dispatch, and run configuration
//! - [`revision`] - Bounded-loop ceilings and clamp policies
//! - [`pipeline`] - The shipped research stages and graph presets
//! - [`citations`] - Source markers and final-report citation rewriting
//! - [`service`] - Generation service trait and request/response types
//! - [`records`] - Run history stores
//! - [`api`] - One-call run submission
//! - [`event_bus`] - Structured run events and sinks

pub mod api;
pub mod citations;
pub mod event_bus;
pub mod graph;
pub mod message;
pub mod pipeline;
pub mod records;
pub mod reducers;
pub mod revision;
pub mod runtime;
pub mod service;
pub mod stage;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod workflow;
