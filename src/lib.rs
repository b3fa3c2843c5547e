//! Tarko: an agent execution kernel.
//!
//! An append-only [`EventStream`](event_stream::EventStream) records
//! everything a run does. The [`Agent`](agent::Agent) run controller drives
//! a model through a pluggable [`ToolCallEngine`](engine::ToolCallEngine),
//! dispatching tool calls via the [`ToolDispatcher`](dispatcher::ToolDispatcher).
//! GUI agents parse free-form model text into screen actions with the
//! [`action_parser`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tarko::prelude::*;
//!
//! # async fn example(provider: Arc<dyn ModelProvider>) -> tarko::error::Result<()> {
//! let agent = Agent::builder()
//!     .with_provider(provider)
//!     .with_instructions("You are a helpful assistant.")
//!     .build()?;
//! let answer = agent.run("What is on my calendar today?").await?;
//! println!("{}", answer.content);
//! # Ok(())
//! # }
//! ```

pub mod action_parser;
pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event_stream;
pub mod gui;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
