//! Pass definitions and the built-in pass list.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a pass comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PassKind {
    BuiltIn,
    Custom,
}

/// A named prompt template applied to the user's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pass {
    pub id: Uuid,
    pub name: String,
    pub prompt: String,
    pub kind: PassKind,
}

impl Pass {
    /// Create a custom pass with a fresh id.
    pub fn custom(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            prompt: prompt.into(),
            kind: PassKind::Custom,
        }
    }

    /// Built-in passes cannot be deleted.
    pub fn is_protected(&self) -> bool {
        self.kind == PassKind::BuiltIn
    }
}

pub const CORE_IDEAS_ID: Uuid = Uuid::from_u128(0xA71924C8_02C4_4517_9E37_701F7A2FE0FD);
pub const CLEAN_UP_ID: Uuid = Uuid::from_u128(0xC8F2A934_B906_411B_AF0F_182A64EE3C4F);
pub const WRITING_FEEDBACK_ID: Uuid = Uuid::from_u128(0x5FBB58F7_0EFD_4F29_B9BA_3978B995DB6C);

const CORE_IDEAS_PROMPT: &str = "Identify the key ideas from the following text. Return them as a bulleted list, one idea per line, at most 10 bullets. Each bullet should briefly elaborate the idea in one sentence.";

const CLEAN_UP_PROMPT: &str = "Rewrite the text by correcting grammar, punctuation and typos. Do NOT change the writer's meaning or tone. Keep the original paragraph structure. Return only the cleaned text, no extra commentary.";

const WRITING_FEEDBACK_PROMPT: &str = "Provide constructive feedback on this writing using the CRIBS framework (Confusing, Repeated, Interesting, Boring, Surprising). Focus on the writing quality and clarity of thought, not grammar or syntax. If this appears to be a journal entry, also provide feedback on the clarity and coherence of the thoughts expressed. Format your response as follows:

## Strengths
- What works well in this writing

## Areas for Improvement
- Confusing: Any unclear or ambiguous sections
- Repeated: Redundant ideas or phrases
- Boring: Parts that lose engagement

## Notable Elements
- Interesting: Engaging or compelling parts
- Surprising: Unexpected insights or turns

## Overall Feedback
Brief constructive advice for improving the writing";

/// The passes compiled into the application, in display order.
///
/// Ids are stable across releases; results keyed by pass id depend on it.
pub fn builtin_passes() -> Vec<Pass> {
    [
        (CORE_IDEAS_ID, "Core Ideas", CORE_IDEAS_PROMPT),
        (CLEAN_UP_ID, "Clean Up", CLEAN_UP_PROMPT),
        (WRITING_FEEDBACK_ID, "Writing Feedback", WRITING_FEEDBACK_PROMPT),
    ]
    .into_iter()
    .map(|(id, name, prompt)| Pass {
        id,
        name: name.to_string(),
        prompt: prompt.to_string(),
        kind: PassKind::BuiltIn,
    })
    .collect()
}
