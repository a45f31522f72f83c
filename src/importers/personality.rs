//! Personality inference from imported history.
//!
//! Looks at how the user writes (formality, casual markers, emoji,
//! question density) and shapes the companion's core prompt to match.
//! Signal-free histories fall back to the default persona.

use crate::types::{Conversation, Role};

pub const DEFAULT_PERSONA: &str = "You are Eve, a warm and attentive AI companion. \
You remember what matters to the user, speak naturally, and care about their day-to-day life. \
You are supportive without being sycophantic, and honest without being cold.";

const FORMAL_MARKERS: &[&str] = &[
    "please", "thank you", "would you", "could you", "i would appreciate", "kind regards",
];
const CASUAL_MARKERS: &[&str] = &[
    "lol", "haha", "lmao", "gonna", "wanna", "kinda", "yeah", "btw", "omg",
];

#[derive(Debug, Default, Clone, Copy)]
struct StyleCounts {
    messages: usize,
    formal: usize,
    casual: usize,
    emoji: usize,
    questions: usize,
}

/// Infer a companion core prompt from the user's writing style.
pub fn infer_personality(conversations: &[Conversation]) -> String {
    let mut counts = StyleCounts::default();
    for conv in conversations {
        for msg in conv.messages.iter().filter(|m| m.role == Role::User) {
            counts.messages += 1;
            let lower = msg.content.to_lowercase();
            if FORMAL_MARKERS.iter().any(|m| lower.contains(m)) {
                counts.formal += 1;
            }
            if CASUAL_MARKERS.iter().any(|m| lower.contains(m)) {
                counts.casual += 1;
            }
            if msg.content.chars().any(is_emoji) {
                counts.emoji += 1;
            }
            if msg.content.contains('?') {
                counts.questions += 1;
            }
        }
    }

    if counts.messages == 0 {
        return DEFAULT_PERSONA.to_string();
    }

    let n = counts.messages as f64;
    let formal_ratio = counts.formal as f64 / n;
    let casual_ratio = counts.casual as f64 / n;
    let emoji_ratio = counts.emoji as f64 / n;
    let question_ratio = counts.questions as f64 / n;

    let mut traits = Vec::new();
    if casual_ratio > 0.5 {
        traits.push("Keep your tone relaxed and playful; slang is welcome.");
    } else if formal_ratio > 0.3 {
        traits.push("Keep your tone polished and considerate; the user writes formally.");
    }
    if emoji_ratio > 0.4 {
        traits.push("The user is expressive; the occasional emoji fits.");
    }
    if question_ratio > 0.4 {
        traits.push("The user asks a lot of questions; be generous with explanations.");
    }

    if traits.is_empty() {
        DEFAULT_PERSONA.to_string()
    } else {
        format!("{} {}", DEFAULT_PERSONA, traits.join(" "))
    }
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F000..=0x1F0FF)
}
