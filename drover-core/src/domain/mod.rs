//! Core domain types
//!
//! This module contains the domain structures shared by the trigger layer and
//! the worker. Everything here is read-only during an orchestration run: the
//! event and project arrive already normalized, pipelines come from the
//! pipeline document loader.

pub mod event;
pub mod pipeline;
pub mod project;
pub mod workload;
