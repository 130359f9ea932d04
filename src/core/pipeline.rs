//! Screenshot-to-HTML generation flow
//!
//! "Code UI" runs four chat turns against the same screenshot: describe
//! the UI, refine that description against the image, generate HTML from
//! it and finally validate and refine the HTML. Later chat requests edit
//! the current HTML without resending the image.

use crate::core::chat::ChatSession;
use crate::core::provider::ProviderError;
use crate::core::screenshot::ImageInput;
use serde::Serialize;
use tracing::info;

/// Steps of the "Code UI" flow, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Describe,
    RefineDescription,
    GenerateHtml,
    RefineHtml,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Describe,
        Stage::RefineDescription,
        Stage::GenerateHtml,
        Stage::RefineHtml,
    ];

    /// Progress message shown while the stage runs
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Describe => "🧑‍💻 Looking at your UI...",
            Stage::RefineDescription => "🔍 Refining description with visual comparison...",
            Stage::GenerateHtml => "🛠️ Generating website...",
            Stage::RefineHtml => "🔧 Refining website...",
        }
    }

    /// Whether the stage's output is HTML rather than prose
    pub fn produces_html(&self) -> bool {
        matches!(self, Stage::GenerateHtml | Stage::RefineHtml)
    }
}

/// Progress notifications emitted while the flow runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted { stage: Stage, label: &'static str },
    StageFinished { stage: Stage, text: String },
}

/// Everything the flow produced
#[derive(Debug, Clone, Serialize)]
pub struct CodeUiOutput {
    pub description: String,
    pub refined_description: String,
    pub initial_html: String,
    pub html: String,
}

/// Prompt texts, parameterized by the CSS framework
#[derive(Debug, Clone)]
pub struct Prompts {
    framework: String,
}

impl Prompts {
    pub fn new(framework: impl Into<String>) -> Self {
        Self {
            framework: framework.into(),
        }
    }

    pub fn describe(&self) -> String {
        "Describe this UI in accurate details. When you reference a UI element put its name and \
         bounding box in the format: [object name (y_min, x_min, y_max, x_max)]. Also Describe \
         the color of the elements."
            .to_string()
    }

    pub fn refine_description(&self, description: &str) -> String {
        format!(
            "Compare the described UI elements with the provided image and identify any missing \
             elements or inaccuracies. Also Describe the color of the elements. Provide a refined \
             and accurate description of the UI elements based on this comparison. Here is the \
             initial description: {}",
            description
        )
    }

    pub fn generate_html(&self, refined_description: &str) -> String {
        format!(
            "Create an HTML file based on the following UI description, using the UI elements \
             described in the previous response. Include {} CSS within the HTML file to style the \
             elements. Make sure the colors used are the same as the original UI. The UI needs to \
             be responsive and mobile-first, matching the original UI as closely as possible. Do \
             not include any explanations or comments. Avoid using ```html. and ``` at the end. \
             ONLY return the HTML code with inline CSS. Here is the refined description: {}",
            self.framework, refined_description
        )
    }

    pub fn refine_html(&self, initial_html: &str) -> String {
        format!(
            "Validate the following HTML code based on the UI description and image and provide a \
             refined version of the HTML code with {} CSS that improves accuracy, responsiveness, \
             and adherence to the original design. ONLY return the refined HTML code with inline \
             CSS. Avoid using ```html. and ``` at the end. Here is the initial HTML: {}",
            self.framework, initial_html
        )
    }

    pub fn chat_refinement(&self, current_html: &str, user_request: &str) -> String {
        format!(
            "Here is the current HTML code:\n```html\n{}\n```\n\nUser request: {}\n\nBased on this \
             request, generate the updated HTML code. Remember to ONLY return the refined HTML \
             code with inline {} CSS. Avoid using ```html. and ``` at the end.",
            current_html, user_request, self.framework
        )
    }
}

/// Run the four "Code UI" stages against `image`
///
/// Every stage reuses `chat`, so later stages see the earlier turns.
/// `on_event` is called before and after each stage.
pub async fn run_code_ui<F>(
    chat: &mut ChatSession,
    prompts: &Prompts,
    image: &ImageInput,
    request_id: Option<String>,
    mut on_event: F,
) -> Result<CodeUiOutput, ProviderError>
where
    F: FnMut(PipelineEvent),
{
    let mut outputs: Vec<String> = Vec::with_capacity(Stage::ALL.len());

    for stage in Stage::ALL {
        let prompt = match stage {
            Stage::Describe => prompts.describe(),
            Stage::RefineDescription => prompts.refine_description(&outputs[0]),
            Stage::GenerateHtml => prompts.generate_html(&outputs[1]),
            Stage::RefineHtml => prompts.refine_html(&outputs[2]),
        };

        info!("Code UI stage {:?} started", stage);
        on_event(PipelineEvent::StageStarted {
            stage,
            label: stage.label(),
        });

        let reply = chat
            .send_message(&prompt, Some(image), request_id.clone())
            .await?;
        let text = if stage.produces_html() {
            strip_code_fences(&reply)
        } else {
            reply
        };

        info!("Code UI stage {:?} finished ({} chars)", stage, text.len());
        on_event(PipelineEvent::StageFinished {
            stage,
            text: text.clone(),
        });
        outputs.push(text);
    }

    let mut outputs = outputs.into_iter();
    Ok(CodeUiOutput {
        description: outputs.next().unwrap_or_default(),
        refined_description: outputs.next().unwrap_or_default(),
        initial_html: outputs.next().unwrap_or_default(),
        html: outputs.next().unwrap_or_default(),
    })
}

/// Apply a free-form change request to the current HTML
///
/// The screenshot is not resent; the model works from the HTML and the
/// chat history.
pub async fn refine_with_request(
    chat: &mut ChatSession,
    prompts: &Prompts,
    current_html: &str,
    user_request: &str,
    request_id: Option<String>,
) -> Result<String, ProviderError> {
    let prompt = prompts.chat_refinement(current_html, user_request);
    let reply = chat.send_message(&prompt, None, request_id).await?;
    Ok(strip_code_fences(&reply))
}

/// Remove a Markdown code fence wrapped around the whole reply
pub fn strip_code_fences(text: &str) -> String {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches("html"),
        };
    }

    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }

    body.trim().to_string()
}

/// Page used for the live preview
///
/// The container tracks the window width so responsive layouts can be
/// checked by resizing the preview.
pub fn preview_document(html: &str) -> String {
    format!(
        r#"<div id="preview-container">
    {html}
</div>
<script>
    const container = document.getElementById('preview-container');
    function resizeIframe() {{
        container.style.width = window.innerWidth + 'px';
    }}
    resizeIframe();
    window.addEventListener('resize', resizeIframe);
</script>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::mock::ScriptedProvider;
    use crate::models::gemini::{GenerationConfig, Part};
    use std::sync::Arc;

    fn test_image() -> ImageInput {
        ImageInput {
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 1,
            height: 1,
            file_name: None,
        }
    }

    fn chat(provider: Arc<ScriptedProvider>) -> ChatSession {
        ChatSession::new(
            provider,
            "gemini-test",
            GenerationConfig::text(0.7, 0.95, 40, 8192),
            vec![],
        )
    }

    #[test]
    fn test_prompts_mention_framework() {
        let prompts = Prompts::new("Tailwind");
        assert!(prompts.generate_html("desc").contains("Include Tailwind CSS"));
        assert!(prompts.refine_html("<p>").contains("with Tailwind CSS"));
        assert!(prompts.chat_refinement("<p>", "make it blue").contains("inline Tailwind CSS"));
        assert!(prompts.describe().contains("(y_min, x_min, y_max, x_max)"));
    }

    #[test]
    fn test_chat_refinement_embeds_html() {
        let prompt = Prompts::new("Regular CSS").chat_refinement("<p>hi</p>", "bigger text");
        assert!(prompt.starts_with("Here is the current HTML code:\n```html\n<p>hi</p>\n```"));
        assert!(prompt.contains("User request: bigger text"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("  <p>x</p>\n"), "<p>x</p>");
        assert_eq!(strip_code_fences("```\n<div></div>```"), "<div></div>");
        assert_eq!(strip_code_fences("```html<p>x</p>```"), "<p>x</p>");
    }

    #[test]
    fn test_preview_document() {
        let doc = preview_document("<h1>Hi</h1>");
        assert!(doc.contains("<div id=\"preview-container\">\n    <h1>Hi</h1>"));
        assert!(doc.contains("window.addEventListener('resize', resizeIframe);"));
    }

    #[tokio::test]
    async fn test_run_code_ui_chains_stages() {
        let provider = Arc::new(ScriptedProvider::with_replies([
            "a header [Header (0, 0, 100, 1000)]",
            "refined header",
            "```html\n<header>v1</header>\n```",
            "<header>v2</header>",
        ]));
        let mut session = chat(provider.clone());
        let prompts = Prompts::new("Bootstrap");
        let mut events = Vec::new();

        let output = run_code_ui(&mut session, &prompts, &test_image(), None, |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(output.description, "a header [Header (0, 0, 100, 1000)]");
        assert_eq!(output.refined_description, "refined header");
        assert_eq!(output.initial_html, "<header>v1</header>");
        assert_eq!(output.html, "<header>v2</header>");
        assert_eq!(events.len(), 8);
        assert!(matches!(
            events[0],
            PipelineEvent::StageStarted { stage: Stage::Describe, .. }
        ));

        let requests = provider.requests();
        assert_eq!(requests.len(), 4);
        let last_turn = requests[3].contents.last().unwrap();
        assert!(last_turn.parts[0].as_text().unwrap().contains("<header>v1</header>"));
        assert!(matches!(last_turn.parts[1], Part::InlineData { .. }));
        assert!(
            requests[1].contents.last().unwrap().parts[0]
                .as_text()
                .unwrap()
                .ends_with("Here is the initial description: a header [Header (0, 0, 100, 1000)]")
        );
    }

    #[tokio::test]
    async fn test_run_code_ui_stops_on_error() {
        let provider = Arc::new(ScriptedProvider::with_replies(["description"]));
        provider.push_reply(Err(ProviderError::Blocked("SAFETY".to_string())));
        let mut session = chat(provider.clone());
        let mut events = Vec::new();

        let err = run_code_ui(
            &mut session,
            &Prompts::new("Regular CSS"),
            &test_image(),
            None,
            |e| events.push(e),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProviderError::Blocked(_)));
        assert_eq!(provider.requests().len(), 2);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_refine_with_request_sends_text_only() {
        let provider = Arc::new(ScriptedProvider::with_replies(["```html\n<p>blue</p>\n```"]));
        let mut session = chat(provider.clone());

        let html = refine_with_request(
            &mut session,
            &Prompts::new("Regular CSS"),
            "<p>red</p>",
            "make it blue",
            None,
        )
        .await
        .unwrap();

        assert_eq!(html, "<p>blue</p>");
        let request = &provider.requests()[0];
        assert_eq!(request.contents[0].parts.len(), 1);
    }
}
