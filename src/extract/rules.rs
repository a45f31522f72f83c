//! Pattern-based memory extraction.
//!
//! One declarative, ordered rule table: each rule carries a trigger
//! pattern, a field extractor, a dedup key and a fixed importance score.
//! Evaluation is per message, first-match-wins per dedup key, and fully
//! deterministic: the same conversations always yield the same
//! candidates. Assistant-authored claims are only kept when the next
//! user turn does not push back on them.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;

use super::MemoryCandidate;
use crate::types::{Conversation, MemoryType, Message, Role};

// ── Importance table ───────────────────────────────────────
// Fixed scalar per rule category; kept explicit so scoring stays
// auditable and testable.
const IMP_NAME: f64 = 0.95;
const IMP_NAME_ECHO: f64 = 0.9;
const IMP_AGE: f64 = 0.9;
const IMP_LOCATION: f64 = 0.85;
const IMP_PROFESSION: f64 = 0.95;
const IMP_JOB_MENTION: f64 = 0.85;
const IMP_TRIP: f64 = 0.9;
const IMP_HOTEL: f64 = 0.8;
const IMP_CONCERT: f64 = 0.85;
const IMP_SONG: f64 = 0.9;
const IMP_RESTAURANT: f64 = 0.75;
const IMP_RELATIONSHIP: f64 = 0.85;
const IMP_INTEREST: f64 = 0.7;
const IMP_PROJECT: f64 = 0.7;
const IMP_PREFERENCE: f64 = 0.65;
const IMP_DREAM: f64 = 0.6;

/// Which speaker a rule listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    User,
    /// Assistant turns, kept only when the next user turn does not
    /// contain a correction signal.
    AssistantConfirmed,
}

pub struct RuleHit {
    pub content: String,
    pub dedup_key: String,
    pub tags: Vec<String>,
}

pub struct Rule {
    pub name: &'static str,
    pub scope: RuleScope,
    pub memory_type: MemoryType,
    pub importance: f64,
    pub category: Option<&'static str>,
    pattern: Regex,
    build: fn(&Captures) -> Option<RuleHit>,
}

/// Captured "names" that are really adjectives/fillers after "I'm ...".
const NAME_SKIP: &[&str] = &[
    "not", "so", "very", "really", "just", "too", "quite", "sure", "sorry", "glad", "happy",
    "here", "back", "going", "gonna", "done", "fine", "good", "okay", "ok", "busy", "tired",
    "hungry", "ready", "curious", "excited", "afraid", "serious", "kidding", "joking", "confused",
    "lost", "home", "sick", "bored", "free", "late", "early", "right", "wrong", "certain",
    "positive", "thinking", "wondering", "trying", "looking", "working", "planning", "hoping",
    "feeling", "still", "now", "currently", "actually", "already", "always", "never", "also",
    "a", "an", "the", "in", "on", "at", "all", "new", "down", "up", "off", "well", "alone",
];

const CORRECTION_WORDS: &[&str] = &["no", "not", "wrong", "actually", "incorrect", "nope"];

static RULES: Lazy<Vec<Rule>> = Lazy::new(build_rules);

fn build_rules() -> Vec<Rule> {
    // Order matters: earlier rules claim their dedup key first.
    vec![
        Rule {
            name: "name_declaration",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_NAME,
            category: None,
            pattern: re(r"(?i)\b(?:my name is|call me|i go by)\s+([a-z]+)\b"),
            build: build_name,
        },
        Rule {
            name: "name_introduction",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_NAME,
            category: None,
            pattern: re(r"(?i)\bi(?:'m| am)\s+([a-z]+)\s*[,.!]?\s*(?:by the way|btw)?\s*$"),
            build: build_name,
        },
        Rule {
            name: "assistant_name_echo",
            scope: RuleScope::AssistantConfirmed,
            memory_type: MemoryType::Fact,
            importance: IMP_NAME_ECHO,
            category: None,
            pattern: re(r"(?:Nice to meet you|Good to meet you|Hello|Hi there),?\s+([A-Z][a-z]+)\b"),
            build: build_name,
        },
        Rule {
            name: "age",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_AGE,
            category: None,
            pattern: re(r"(?i)\bi(?:'m| am)\s+(\d{1,2})\s+years?\s+old\b"),
            build: |c| {
                Some(RuleHit {
                    content: format!("User is {} years old", &c[1]),
                    dedup_key: "age".to_string(),
                    tags: Vec::new(),
                })
            },
        },
        Rule {
            name: "location",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_LOCATION,
            category: None,
            pattern: re(r"(?i)\bi (?:live|grew up) in\s+([a-z][a-z .'\-]{2,30}?)(?:\s+and\b|\s+but\b|[.!?,\n]|$)"),
            build: |c| {
                let place = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("location_{}", norm_key(&place)),
                    content: format!("User lives in {}", title_case(&place)),
                    tags: Vec::new(),
                })
            },
        },
        Rule {
            name: "origin",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_LOCATION,
            category: None,
            pattern: re(r"(?i)\bi(?:'m| am) from\s+([a-z][a-z .'\-]{2,30}?)(?:\s+and\b|\s+but\b|[.!?,\n]|$)"),
            build: |c| {
                let place = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("origin_{}", norm_key(&place)),
                    content: format!("User is from {}", title_case(&place)),
                    tags: Vec::new(),
                })
            },
        },
        Rule {
            name: "profession",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_PROFESSION,
            category: Some("work"),
            pattern: re(r"(?i)\bi work as an?\s+([a-z][a-z /\-]{2,40}?)(?:[.!?,\n]|$)"),
            build: |c| {
                let job = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: "profession".to_string(),
                    content: format!("User works as a {}", job),
                    tags: vec!["work".to_string()],
                })
            },
        },
        Rule {
            name: "job_mention",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_JOB_MENTION,
            category: Some("work"),
            pattern: re(r"(?i)\bmy job is\s+([^.!?,\n]{3,60})"),
            build: |c| {
                let job = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: "profession".to_string(),
                    content: format!("User's job is {}", job),
                    tags: vec!["work".to_string()],
                })
            },
        },
        Rule {
            name: "trip",
            scope: RuleScope::User,
            memory_type: MemoryType::Experience,
            importance: IMP_TRIP,
            category: Some("travel"),
            pattern: re(
                r"(?i)\b(?:i'?m|we'?re|i am|we are)\s+(?:going|traveling|travelling|flying|headed)\s+to\s+(?-i:([A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*){0,3}))",
            ),
            build: |c| {
                let place = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("trip_{}", norm_key(&place)),
                    content: format!("User is planning a trip to {}", place),
                    tags: vec!["travel".to_string()],
                })
            },
        },
        Rule {
            name: "hotel",
            scope: RuleScope::User,
            memory_type: MemoryType::Experience,
            importance: IMP_HOTEL,
            category: Some("travel"),
            pattern: re(r"(?i)\bstaying at (?:the\s+)?(?-i:([A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*){0,4}))"),
            build: |c| {
                let place = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("hotel_{}", norm_key(&place)),
                    content: format!("User stayed at {}", place),
                    tags: vec!["travel".to_string()],
                })
            },
        },
        Rule {
            name: "concert",
            scope: RuleScope::User,
            memory_type: MemoryType::Experience,
            importance: IMP_CONCERT,
            category: Some("music"),
            pattern: re(
                r"(?i)\b(?:went to|going to|saw|seeing)\s+(?:the\s+|an?\s+)?(?-i:([A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*){0,4}))\s+(?:concert|show|gig)\b",
            ),
            build: |c| {
                let artist = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("concert_{}", norm_key(&artist)),
                    content: format!("User went to a {} concert", artist),
                    tags: vec!["music".to_string(), "event".to_string()],
                })
            },
        },
        Rule {
            name: "song",
            scope: RuleScope::User,
            memory_type: MemoryType::Preference,
            importance: IMP_SONG,
            category: Some("music"),
            pattern: re(r#""([^"]{2,80})"\s+by\s+(?-i:([A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*){0,4}))"#),
            build: |c| {
                let song = clean_capture(&c[1]);
                let artist = clean_capture(&c[2]);
                Some(RuleHit {
                    dedup_key: format!("song_{}", norm_key(&song)),
                    content: format!("User likes \"{}\" by {}", song, artist),
                    tags: vec!["music".to_string(), artist.to_lowercase()],
                })
            },
        },
        Rule {
            name: "restaurant",
            scope: RuleScope::User,
            memory_type: MemoryType::Experience,
            importance: IMP_RESTAURANT,
            category: Some("food"),
            pattern: re(
                r"(?i)\b(?:ate|dined|had (?:dinner|lunch|brunch)) at\s+(?:the\s+)?(?-i:([A-Z][\w.'\-]*(?:\s+[A-Z][\w.'\-]*){0,4}))",
            ),
            build: |c| {
                let place = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("restaurant_{}", norm_key(&place)),
                    content: format!("User ate at {}", place),
                    tags: vec!["food".to_string()],
                })
            },
        },
        Rule {
            name: "relationship",
            scope: RuleScope::User,
            memory_type: MemoryType::Fact,
            importance: IMP_RELATIONSHIP,
            category: Some("relationship"),
            pattern: re(
                r"(?i)\bmy (girlfriend|boyfriend|wife|husband|partner|mom|mother|dad|father|sister|brother|best friend|son|daughter)\b(?:\s+is\s+(?:named|called)\s+(?-i:([A-Z][a-z]+)))?",
            ),
            build: |c| {
                let relation = c[1].to_lowercase();
                let content = match c.get(2) {
                    Some(name) => format!("User's {} is named {}", relation, name.as_str()),
                    None => format!("User has a {}", relation),
                };
                Some(RuleHit {
                    dedup_key: format!("relationship_{}", norm_key(&relation)),
                    content,
                    tags: vec!["relationship".to_string()],
                })
            },
        },
        Rule {
            name: "interest",
            scope: RuleScope::User,
            memory_type: MemoryType::Preference,
            importance: IMP_INTEREST,
            category: None,
            pattern: re(r"(?i)\bi(?:'m| am) (?:interested in|passionate about|really into)\s+([^.!?,\n]{3,60})"),
            build: |c| {
                let what = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("interest_{}", norm_key(&what)),
                    content: format!("User is interested in {}", what),
                    tags: Vec::new(),
                })
            },
        },
        Rule {
            name: "project",
            scope: RuleScope::User,
            memory_type: MemoryType::Context,
            importance: IMP_PROJECT,
            category: Some("work"),
            pattern: re(r"(?i)\bi(?:'m| am) (?:working on|building|writing)\s+([^.!?\n]{3,80})"),
            build: |c| {
                let what = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("project_{}", norm_key(&what)),
                    content: format!("User is working on {}", what),
                    tags: vec!["work".to_string()],
                })
            },
        },
        Rule {
            name: "preference",
            scope: RuleScope::User,
            memory_type: MemoryType::Preference,
            importance: IMP_PREFERENCE,
            category: None,
            pattern: re(r"(?i)\bi (?:love|really like|enjoy|adore)\s+([^.!?,\n]{3,60})"),
            build: |c| {
                let what = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("pref_{}", norm_key(&what)),
                    content: format!("User loves {}", what),
                    tags: Vec::new(),
                })
            },
        },
        Rule {
            name: "dream",
            scope: RuleScope::User,
            memory_type: MemoryType::Experience,
            importance: IMP_DREAM,
            category: Some("dream"),
            pattern: re(r"(?i)\bi (?:had a dream|dreamt|dreamed)\s+(?:about\s+)?([^.!?\n]{3,80})"),
            build: |c| {
                let what = clean_capture(&c[1]);
                Some(RuleHit {
                    dedup_key: format!("dream_{}", norm_key(&what)),
                    content: format!("User had a dream about {}", what),
                    tags: vec!["dream".to_string()],
                })
            },
        },
    ]
}

fn re(pattern: &str) -> Regex {
    // Table patterns are compile-time constants; a bad one is a programmer
    // error caught by the table test below.
    Regex::new(pattern).unwrap_or_else(|e| panic!("bad rule pattern {:?}: {}", pattern, e))
}

fn build_name(c: &Captures) -> Option<RuleHit> {
    let raw = c[1].trim();
    if NAME_SKIP.contains(&raw.to_lowercase().as_str()) || raw.len() < 2 {
        return None;
    }
    let name = title_case(raw);
    Some(RuleHit {
        dedup_key: format!("name_{}", raw.to_lowercase()),
        content: format!("User's name is {}", name),
        tags: Vec::new(),
    })
}

/// Run the full rule table over the conversations. Pure: a fresh seen-set
/// per call, no consultation of persisted memories.
pub fn extract(conversations: &[Conversation]) -> Vec<MemoryCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for conv in conversations {
        for (i, msg) in conv.messages.iter().enumerate() {
            let scope = match msg.role {
                Role::User => RuleScope::User,
                Role::Assistant => {
                    if next_user_turn_corrects(&conv.messages[i + 1..]) {
                        continue;
                    }
                    RuleScope::AssistantConfirmed
                }
            };
            apply_rules(&msg.content, scope, &mut seen, &mut out);
        }
    }
    out
}

pub(crate) fn apply_rules(
    content: &str,
    scope: RuleScope,
    seen: &mut HashSet<String>,
    out: &mut Vec<MemoryCandidate>,
) {
    for rule in RULES.iter().filter(|r| r.scope == scope) {
        let Some(caps) = rule.pattern.captures(content) else {
            continue;
        };
        let Some(hit) = (rule.build)(&caps) else {
            continue;
        };
        if !seen.insert(hit.dedup_key) {
            continue; // first match wins
        }
        out.push(MemoryCandidate {
            content: hit.content,
            memory_type: rule.memory_type,
            importance: rule.importance,
            category: rule.category.map(String::from),
            tags: hit.tags,
        });
    }
}

/// An assistant claim is only kept if the user's next turn does not
/// push back on it.
fn next_user_turn_corrects(rest: &[Message]) -> bool {
    rest.iter()
        .find(|m| m.role == Role::User)
        .map(|m| has_correction_signal(&m.content))
        .unwrap_or(false)
}

pub(crate) fn has_correction_signal(text: &str) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| CORRECTION_WORDS.contains(&w))
}

fn norm_key(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn clean_capture(s: &str) -> String {
    s.trim()
        .trim_end_matches(['.', ',', '!', '?'])
        .trim()
        .to_string()
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
