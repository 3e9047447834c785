//! The judgment oracle: clusters articles into events and supplies scoring
//! drivers. Responses come back as raw text; parsing and validation happen
//! on this side so a malformed reply is always a caller-visible error.

pub mod claude;
pub mod prompts;

use anyhow::Result;
use async_trait::async_trait;

use smokescreen_common::{Article, Event};

pub use claude::ClaudeOracle;

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Group `articles` (numbered from 0 in order) into event descriptors.
    /// `existing_titles` are events already tracked this week.
    async fn cluster_articles(
        &self,
        articles: &[Article],
        existing_titles: &[String],
    ) -> Result<String>;

    /// Driver values for one event, judged from its articles.
    async fn score_event(&self, event: &Event, articles: &[Article]) -> Result<String>;
}

/// Strip markdown code fences from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_blocks("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  []  "), "[]");
    }
}
