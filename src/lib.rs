//! HTTP bridge from Home Assistant event notifications to the OpenClaw agent.
//!
//! `POST /webhook` authenticates with a shared token, normalizes the JSON body
//! into a [`event::CanonicalEvent`], wakes the agent through its gateway CLI
//! and appends one audit line per request.

pub mod audit;
pub mod bin_resolver;
pub mod cli;
pub mod config;
pub mod event;
pub mod runner;
pub mod server;
pub mod token;
pub mod wake;
