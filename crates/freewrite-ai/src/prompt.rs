//! Prompt templates for the built-in enhancement operations.

/// Placeholder substituted with the user's text in custom templates.
pub const TEXT_PLACEHOLDER: &str = "{{text}}";

pub fn cleaned_text(text: &str) -> String {
    format!(
        "You are a helpful writing assistant. The user will give you a freewriting text. \
         Rewrite it by correcting grammar, punctuation and typos. Do NOT change the writer's \
         meaning or tone. Return only the cleaned text, no extra commentary.\n\n\
         Text:\n{}\n\nCleaned text:",
        text
    )
}

pub fn summary(text: &str) -> String {
    format!(
        "Summarise the following text in 3-4 sentences. Preserve the writer's intent.\n\n\
         Text:\n{}\n\nSummary:",
        text
    )
}

/// Ends with an open bullet so the model continues the list.
pub fn key_ideas(text: &str) -> String {
    format!(
        "Identify the key ideas from the following text. Return them as a bulleted list, \
         one idea per line, at most 10 bullets. Each bullet should briefly elaborate the \
         idea in one sentence.\n\nText:\n{}\n\nKey ideas:\n-",
        text
    )
}

/// Substitute `{{text}}` in `template`, or append the text after it.
pub fn custom(template: &str, text: &str) -> String {
    if template.contains(TEXT_PLACEHOLDER) {
        template.replace(TEXT_PLACEHOLDER, text)
    } else {
        format!("{}\n\nText:\n{}", template, text)
    }
}

/// One prompt asking for all three sections, delimited for `ResponseParser`.
pub fn combined(text: &str) -> String {
    format!(
        r#"You are a helpful writing assistant. Process the following freewriting text and provide three things:

1. CLEANED TEXT: Correct grammar, punctuation and typos. Do NOT change the writer's meaning or tone.

2. SUMMARY: Summarize in 3-4 sentences preserving the writer's intent.

3. KEY IDEAS: List the key ideas as bullets (max 10), briefly elaborating each in one sentence.

Format your response EXACTLY as follows:
=== CLEANED TEXT ===
[cleaned text here]

=== SUMMARY ===
[summary here]

=== KEY IDEAS ===
- [idea 1]
- [idea 2]
- [etc]

Text:
{}"#,
        text
    )
}
