//! Test doubles for exercising workers and pipelines without the remote services.
//!
//! [`gateway::FakeGateway`] answers every stage from memory, can be scripted to fail or return
//! incomplete data for chosen points, and records calls so tests can check retry accounting
//! and that no point is ever processed by two workers at once. [`points`] builds seeds for it.

pub mod gateway;
pub mod points;
