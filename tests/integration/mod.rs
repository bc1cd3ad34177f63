//! Integration tests for the altscan image annotation engine

mod config_integration;
mod engine_lifecycle;
mod inline_editing;
mod mutation_scanning;
