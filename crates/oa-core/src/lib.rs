//! # oa-core
//!
//! Core types, traits, and configuration for Oro Attachments RS.
//!
//! This crate provides the building blocks shared by the other crates:
//! - Identifier type alias and entity traits (Identifiable, ParentEntity)
//! - Configuration types and loading

pub mod config;
pub mod traits;

pub use config::*;
pub use traits::*;
