//! API data models
//!
//! This module contains the Gemini `generateContent` wire structures.

pub mod gemini;
