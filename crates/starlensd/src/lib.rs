//! starlensd — HTTP front end for the starlens classifier.

pub mod api;
pub mod config;
pub mod dto;
pub mod engine;
