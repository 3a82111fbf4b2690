//! LLM prompts for summarization.

/// Collection of prompts used to summarize tree nodes.
pub struct Prompts;

impl Prompts {
    /// System prompt for summarizing raw section text.
    pub fn system_summarizer() -> &'static str {
        "You are a helpful assistant that creates concise, informative summaries of document content."
    }

    /// System prompt for merging section summaries.
    pub fn system_synthesizer() -> &'static str {
        "You are a helpful assistant that creates cohesive summaries by synthesizing information from multiple sections."
    }

    /// Prompt to summarize the text of a leaf.
    pub fn summarize_content() -> &'static str {
        r#"Please provide a concise summary of the following content.

{context}

Content:
{content}

Summary:"#
    }

    /// Prompt to synthesize the summaries of a node's children.
    pub fn synthesize_summaries() -> &'static str {
        r#"Please create a cohesive summary that synthesizes the following section summaries:

{page_range}

Section summaries:
{summaries}

Synthesized summary:"#
    }

    /// Fill in [`Prompts::summarize_content`].
    pub fn render_summarize(content: &str, context: &str) -> String {
        let context = if context.is_empty() {
            String::new()
        } else {
            format!("Context: {}", context)
        };
        Self::summarize_content()
            .replace("{context}", &context)
            .replace("{content}", content)
    }

    /// Fill in [`Prompts::synthesize_summaries`].
    pub fn render_synthesize(child_summaries: &[String], page_range: &str) -> String {
        let page_range = if page_range.is_empty() {
            String::new()
        } else {
            format!("Page range: {}", page_range)
        };
        Self::synthesize_summaries()
            .replace("{page_range}", &page_range)
            .replace("{summaries}", &child_summaries.join("\n\n"))
    }
}
