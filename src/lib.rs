//! Outreach: personalised cold-email generation and dispatch.

pub mod batch;
pub mod campaign;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod generation;
pub mod llm;
pub mod session;
