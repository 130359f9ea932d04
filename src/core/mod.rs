//! Core application modules
//!
//! This module contains configuration, constants, logging, the model
//! providers and the screenshot-to-HTML flow built on top of them.

pub mod chat;
pub mod config;
pub mod constants;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod providers;
pub mod screenshot;
pub mod session;
