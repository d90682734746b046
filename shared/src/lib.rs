//! Re-exports the shared building blocks of the survey pipeline, allowing the
//! service crate to pull in configuration handling, error types, the survey
//! data model, the data-store interface, and the generation client from a
//! single crate.

pub mod config;
pub mod db;
pub mod dto;
pub mod error;
pub mod openai_client;
pub mod output_schema;
