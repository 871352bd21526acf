//! Best-effort extraction of the combined enhancement response.
//!
//! The model is asked to answer with three sections, each announced by a
//! header between `===` delimiters. Models do not always comply, so the
//! parser never fails: anything it cannot find keeps its default.

use serde::Serialize;

const SECTION_DELIMITER: &str = "===";

/// The three derived results for one piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnhancementResult {
    pub cleaned_text: String,
    pub summary: String,
    pub key_ideas: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    CleanedText,
    Summary,
    KeyIdeas,
}

impl Section {
    const ALL: [Section; 3] = [Section::CleanedText, Section::Summary, Section::KeyIdeas];

    fn label(self) -> &'static str {
        match self {
            Section::CleanedText => "cleaned text",
            Section::Summary => "summary",
            Section::KeyIdeas => "key ideas",
        }
    }

    /// Recognise a header fragment such as `SUMMARY OF THE TEXT`.
    ///
    /// A header sits on one line. Text before the first delimiter
    /// (`enclosed == false`) only counts when it is the bare label.
    fn detect(fragment: &str, enclosed: bool) -> Option<Section> {
        let trimmed = fragment.trim();
        if trimmed.is_empty() || trimmed.contains('\n') {
            return None;
        }

        let text = format!(" {} ", normalize(trimmed).join(" "));
        Self::ALL.into_iter().find(|section| {
            let label = section.label();
            if enclosed {
                text.contains(&format!(" {} ", label))
            } else {
                text.trim() == label
            }
        })
    }

    fn is_label_line(line: &str) -> bool {
        let text = normalize(line).join(" ");
        Self::ALL.into_iter().any(|section| text == section.label())
    }
}

/// Lowercased alphabetic words of `s`.
fn normalize(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Parser for the delimited combined response.
pub struct ResponseParser;

impl ResponseParser {
    /// Parse `response`, falling back to the response itself as cleaned text.
    pub fn parse(response: &str) -> EnhancementResult {
        Self::parse_with_fallback(response, response)
    }

    /// Parse `response`; `fallback` becomes the cleaned text when no cleaned
    /// section is found.
    pub fn parse_with_fallback(response: &str, fallback: &str) -> EnhancementResult {
        let mut result = EnhancementResult {
            cleaned_text: fallback.to_string(),
            ..EnhancementResult::default()
        };

        let fragments: Vec<&str> = response.split(SECTION_DELIMITER).collect();
        let mut i = 0;
        while i < fragments.len() {
            let Some(section) = Section::detect(fragments[i], i > 0) else {
                i += 1;
                continue;
            };
            let Some(body) = fragments.get(i + 1) else {
                break;
            };

            let body = strip_header_echoes(body);
            match section {
                Section::CleanedText => result.cleaned_text = body,
                Section::Summary => result.summary = body,
                Section::KeyIdeas => result.key_ideas = parse_bullets(&body),
            }
            // A body is never re-read as a header.
            i += 2;
        }

        result
    }
}

/// Drop lines that only repeat a section label and a label echoed at the
/// very end of the body, then trim.
fn strip_header_echoes(body: &str) -> String {
    let body = body
        .lines()
        .filter(|line| !Section::is_label_line(line))
        .collect::<Vec<_>>()
        .join("\n");
    strip_trailing_echo(body.trim()).to_string()
}

/// `Hello there. SUMMARY` -> `Hello there.`
fn strip_trailing_echo(body: &str) -> &str {
    let end = body.trim_end_matches(|c: char| c == ':' || c.is_whitespace());
    for section in Section::ALL {
        let echo = section.label().to_uppercase();
        if let Some(rest) = end.strip_suffix(echo.as_str()) {
            if rest.is_empty() || rest.ends_with(char::is_whitespace) {
                return rest.trim_end();
            }
        }
    }
    body
}

/// Split a bulleted list into its items.
///
/// One leading marker is removed per line. `-` and `*` only count as markers
/// when followed by whitespace, so `-5 degrees` keeps its sign.
pub fn parse_bullets(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| strip_bullet(line.trim()))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_bullet(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix('•') {
        return rest.trim_start();
    }
    for marker in ['-', '*'] {
        if let Some(rest) = line.strip_prefix(marker) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    line
}
