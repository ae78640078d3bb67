//! LLM Provider implementations for Scout.
//!
//! All providers implement the `scout_core::Provider` trait.
//! `build_from_config` selects the backend named in configuration.

pub mod factory;
pub mod openai_compat;

pub use factory::build_from_config;
pub use openai_compat::OpenAiCompatProvider;
