//! Retrieval service access and knowledge rendering.

pub mod augment;
pub mod client;

pub use augment::{KnowledgeAugmenter, render_knowledge};
pub use client::{RagClient, RetrievalService};
