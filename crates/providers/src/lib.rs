//! Text-generation provider implementations for DeepSearch.
//!
//! All providers implement the `deepsearch_core::Provider` trait.

pub mod openai_compat;
pub mod scripted;

pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{ScriptedProvider, ScriptedTurn};
