use std::fmt::Write;

use smokescreen_common::{Article, Event, MechanismOfHarm};

pub const CLUSTER_SYSTEM: &str = "You group news articles about government and politics into \
distinct real-world events. Several articles often describe the same action; group them together. \
Respond with a JSON array only, no commentary.";

pub const SCORE_SYSTEM: &str = "You are a careful analyst rating one news event on two \
independent axes: concrete governance damage, and manufactured attention. Rate each driver on \
a 0-5 scale from the articles alone. Do not compute totals.";

pub fn cluster_prompt(articles: &[Article], existing_titles: &[String]) -> String {
    let mut out = String::new();

    if !existing_titles.is_empty() {
        out.push_str(
            "Events already tracked this week. If an article covers one of these, \
             reuse its exact title instead of inventing a new event:\n",
        );
        for title in existing_titles {
            let _ = writeln!(out, "- {title}");
        }
        out.push('\n');
    }

    out.push_str("Articles:\n");
    for (i, a) in articles.iter().enumerate() {
        let date = a
            .published_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        let _ = writeln!(out, "[{i}] {} ({}, {date})", a.headline, a.publisher);
    }

    let mechanisms: Vec<&str> = MechanismOfHarm::ALL.iter().map(|m| m.as_str()).collect();
    let _ = write!(
        out,
        "\nReturn a JSON array. Each element:\n\
         {{\"title\": string, \"event_date\": \"YYYY-MM-DD\" | null, \"summary\": string, \
         \"mechanism_of_harm\": one of [{}] | null, \
         \"scope\": \"national\" | \"regional\" | \"local\" | null, \
         \"affected_population\": \"general\" | \"vulnerable\" | \"specific\" | null, \
         \"actors\": [string], \"institution\": string | null, \"topic_tags\": [string], \
         \"article_indices\": [number], \"confidence\": number between 0 and 1}}\n\
         Every article index must refer to the numbered list above.",
        mechanisms.join(", ")
    );

    out
}

pub fn score_prompt(event: &Event, articles: &[Article]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Event: {}", event.title);
    if !event.summary.is_empty() {
        let _ = writeln!(out, "Summary: {}", event.summary);
    }
    if let Some(m) = event.mechanism {
        let _ = writeln!(out, "Mechanism: {m}");
    }
    if !event.actors.is_empty() {
        let _ = writeln!(out, "Actors: {}", event.actors.join(", "));
    }

    out.push_str("\nCoverage:\n");
    for a in articles {
        let _ = writeln!(out, "- {} ({})", a.headline, a.publisher);
    }

    out.push_str(
        "\nRate the damage drivers, severity multipliers (0.8-1.3), hype drivers and \
         strategic drivers. Count intentionality indicators (0-15). Set institutional_lever \
         when a formal institutional power was exercised. List noise_codes (e.g. celebrity, \
         horse_race, gossip) when the story is mostly noise.",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use smokescreen_common::SourceArticle;

    #[test]
    fn cluster_prompt_numbers_articles_from_zero() {
        let articles: Vec<Article> = ["First headline here", "Second headline here"]
            .iter()
            .map(|h| {
                Article::from_source(
                    SourceArticle {
                        url: format!("https://x.com/{h}"),
                        headline: h.to_string(),
                        publisher: "Wire".to_string(),
                        published_at: None,
                        source_tag: "t".to_string(),
                    },
                    h.to_string(),
                )
            })
            .collect();

        let prompt = cluster_prompt(&articles, &["Known event".to_string()]);
        assert!(prompt.contains("[0] First headline here"));
        assert!(prompt.contains("[1] Second headline here"));
        assert!(prompt.contains("- Known event"));
        assert!(prompt.contains("election_interference"));
    }
}
