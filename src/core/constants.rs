//! Constants for the Gemini wire format and the generator defaults
//!
//! Role names, MIME types, safety categories, finish reasons and the
//! default generation settings used when nothing is configured.

/// Content role constants
pub mod role {
    /// User role identifier
    pub const USER: &str = "user";

    /// Model role identifier (Gemini's name for the assistant)
    pub const MODEL: &str = "model";
}

/// Chat history labels shown in the UI
pub mod history {
    /// Label of the entry holding the pipeline's first HTML
    pub const INITIAL_HTML: &str = "Initial HTML Code";

    /// User turn
    pub const USER: &str = "user";

    /// Assistant turn
    pub const ASSISTANT: &str = "assistant";
}

/// MIME type constants
pub mod mime {
    pub const JPEG: &str = "image/jpeg";
    pub const PNG: &str = "image/png";
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const HTML: &str = "text/html; charset=utf-8";
}

/// Safety setting constants
pub mod safety {
    pub const HARASSMENT: &str = "HARM_CATEGORY_HARASSMENT";
    pub const HATE_SPEECH: &str = "HARM_CATEGORY_HATE_SPEECH";
    pub const SEXUALLY_EXPLICIT: &str = "HARM_CATEGORY_SEXUALLY_EXPLICIT";
    pub const DANGEROUS_CONTENT: &str = "HARM_CATEGORY_DANGEROUS_CONTENT";

    /// Threshold that disables blocking for a category
    pub const BLOCK_NONE: &str = "BLOCK_NONE";

    /// Categories configured on every request
    pub const CATEGORIES: [&str; 4] = [HARASSMENT, HATE_SPEECH, SEXUALLY_EXPLICIT, DANGEROUS_CONTENT];
}

/// Candidate finish reasons
pub mod finish {
    pub const STOP: &str = "STOP";
    pub const MAX_TOKENS: &str = "MAX_TOKENS";
    pub const SAFETY: &str = "SAFETY";
}

/// Generation defaults
pub mod defaults {
    pub const MODEL: &str = "gemini-2.0-flash-exp";
    pub const CSS_FRAMEWORK: &str = "Regular CSS";
    pub const TEMPERATURE: f32 = 0.7;
    pub const TOP_P: f32 = 0.95;
    pub const TOP_K: u32 = 40;
    pub const MAX_OUTPUT_TOKENS: u32 = 8192;
    pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const VERTEXAI_LOCATION: &str = "us-central1";
}
