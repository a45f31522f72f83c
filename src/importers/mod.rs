//! Format parsers: one adapter per source platform, auto-detected by
//! content sniffing. Each parser is a pure function of raw export text
//! into the canonical model; nothing here touches the database.

pub mod chatgpt;
pub mod claude;
pub mod grok;
pub mod personality;
pub mod share_link;

use crate::error::EngineError;
use crate::types::ImportedData;

/// Minimum characters a parsed export must yield to count as content.
pub const MIN_CONTENT_LEN: usize = 50;

pub trait ImportParser: Send + Sync {
    /// Platform name, e.g. "chatgpt".
    fn name(&self) -> &'static str;

    /// Cheap sniff: does this raw content look like this platform's export?
    fn validate(&self, raw: &str) -> bool;

    /// Full parse into the canonical model. Messages must come out in
    /// chronological order regardless of the source's internal structure.
    fn parse(&self, raw: &str, user_id: &str) -> Result<ImportedData, EngineError>;
}

/// Registered parsers, in detection order. Grok goes first: its markdown
/// markers are more specific than ChatGPT's permissive JSON sniff.
pub fn registry() -> Vec<Box<dyn ImportParser>> {
    vec![
        Box::new(grok::GrokParser),
        Box::new(chatgpt::ChatGptParser),
        Box::new(claude::ClaudeParser),
    ]
}

/// First parser whose `validate` accepts the content, or None.
pub fn detect_parser(raw: &str) -> Option<Box<dyn ImportParser>> {
    registry().into_iter().find(|p| p.validate(raw))
}

/// Detect and parse in one step. Unrecognized content is a hard error,
/// never an empty success.
pub fn parse_any(raw: &str, user_id: &str) -> Result<(ImportedData, String), EngineError> {
    let parser = detect_parser(raw).ok_or(EngineError::UnrecognizedFormat)?;
    let name = parser.name().to_string();
    let data = parser.parse(raw, user_id)?;
    Ok((data, name))
}

/// Total message count across parsed conversations.
pub(crate) fn message_count(data: &ImportedData) -> usize {
    data.conversations.iter().map(|c| c.messages.len()).sum()
}
