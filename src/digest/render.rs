// src/digest/render.rs
//! Channel renderings of a `Digest`: plain text, HTML, Slack Block Kit, Discord embeds.

use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::{json, Value};

use super::{Digest, EMPTY_DIGEST_TEXT};
use crate::enrich::EnrichedRecord;

/// Slack rejects messages with more than 50 blocks.
const SLACK_MAX_BLOCKS: usize = 50;
const SLACK_SECTION_MAX_CHARS: usize = 2900;
const SLACK_HEADER_MAX_CHARS: usize = 150;
const DISCORD_TITLE_MAX_CHARS: usize = 256;
const DISCORD_DESCRIPTION_MAX_CHARS: usize = 4000;
const DISCORD_COLOR: u32 = 0x007c_ba;

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

impl Digest {
    pub fn heading(&self) -> String {
        format!("{} - {}", self.title, self.date_label())
    }

    /// Line-oriented form used by email text parts, logs and plain chat channels.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.heading());
        if self.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{EMPTY_DIGEST_TEXT}");
            return out;
        }
        let _ = writeln!(
            out,
            "{} {}",
            self.item_count,
            if self.item_count == 1 { "item" } else { "items" }
        );
        let _ = writeln!(out);
        for (i, r) in self.records.iter().enumerate() {
            let _ = writeln!(out, "{}. [{}] {}", i + 1, r.tag, r.display_title);
            let _ = writeln!(out, "   {}", r.summary);
            if let Some(url) = &r.record.url {
                let _ = writeln!(out, "   {url}");
            }
            let _ = writeln!(out);
        }
        out
    }

    /// Standalone HTML document for the email alternative part. All fields escaped.
    pub fn render_html(&self) -> String {
        let mut out = String::with_capacity(2048 + self.records.len() * 512);
        out.push_str(
            "<html><head><meta charset=\"utf-8\"><style>\
             body{font-family:Arial,sans-serif;line-height:1.6;color:#333}\
             .header{background:#f4f4f4;padding:20px;border-radius:5px;margin-bottom:20px}\
             .entry{margin-bottom:25px;padding:15px;border-left:4px solid #007cba;background:#f9f9f9}\
             .tag{background:#007cba;color:#fff;padding:3px 8px;border-radius:3px;font-size:12px}\
             .title{font-weight:bold;margin:10px 0 5px 0;color:#2c3e50}\
             .meta{color:#777;font-size:12px}\
             .url a{color:#007cba;text-decoration:none}\
             </style></head><body>",
        );
        let _ = write!(
            out,
            "<div class=\"header\"><h2>{}</h2><p><strong>Date:</strong> {}</p><p><strong>Total Items:</strong> {}</p></div>",
            encode_text(&self.title),
            encode_text(&self.date_label()),
            self.item_count
        );
        if self.is_empty() {
            let _ = write!(out, "<p>{}</p>", encode_text(EMPTY_DIGEST_TEXT));
        }
        for (i, r) in self.records.iter().enumerate() {
            let _ = write!(
                out,
                "<div class=\"entry\"><span class=\"tag\">{}</span><div class=\"title\">{}. {}</div><div class=\"summary\">{}</div>",
                encode_text(&r.tag),
                i + 1,
                encode_text(&r.display_title),
                encode_text(&r.summary)
            );
            if let Some(meta) = meta_line(r) {
                let _ = write!(out, "<div class=\"meta\">{}</div>", encode_text(&meta));
            }
            if let Some(url) = &r.record.url {
                let _ = write!(
                    out,
                    "<div class=\"url\"><a href=\"{}\" target=\"_blank\">Read more</a></div>",
                    encode_double_quoted_attribute(url)
                );
            }
            out.push_str("</div>");
        }
        out.push_str("</body></html>");
        out
    }

    /// Block Kit blocks for one Slack message. Items that do not fit the block
    /// limit are summarized in a trailing note.
    pub fn render_slack_blocks(&self) -> Vec<Value> {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": clip(&format!("📰 {}", self.title), SLACK_HEADER_MAX_CHARS) }
            }),
        ];
        let status = if self.is_empty() {
            format!("*Date:* {}\n*Status:* {}", self.date_label(), EMPTY_DIGEST_TEXT)
        } else {
            format!(
                "*Date:* {}\n*Total Items:* {} relevant items found",
                self.date_label(),
                self.item_count
            )
        };
        blocks.push(json!({ "type": "section", "text": { "type": "mrkdwn", "text": status } }));
        blocks.push(json!({ "type": "divider" }));

        for (i, r) in self.records.iter().enumerate() {
            // entry + context + divider, and room for the overflow note
            if blocks.len() + 4 > SLACK_MAX_BLOCKS {
                let rest = self.records.len() - i;
                blocks.push(json!({
                    "type": "context",
                    "elements": [{ "type": "mrkdwn", "text": format!("...and {rest} more items (see email digest)") }]
                }));
                break;
            }
            let text = clip(
                &format!("*{}. {}*\n\n{}", i + 1, r.display_title, r.summary),
                SLACK_SECTION_MAX_CHARS,
            );
            let mut section = json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } });
            if let Some(url) = &r.record.url {
                section["accessory"] = json!({
                    "type": "button",
                    "text": { "type": "plain_text", "text": "Read More" },
                    "url": url,
                    "action_id": format!("read_more_{}", i + 1),
                });
            }
            let mut elements = vec![json!({
                "type": "mrkdwn",
                "text": format!("{} *{}*", r.record.source_kind.emoji(), r.tag)
            })];
            if !r.record.source.is_empty() {
                elements.push(json!({ "type": "mrkdwn", "text": format!("• Source: {}", r.record.source) }));
            }
            if let Some(author) = &r.record.author {
                elements.push(json!({ "type": "mrkdwn", "text": format!("• Author: {author}") }));
            }
            blocks.push(section);
            blocks.push(json!({ "type": "context", "elements": elements }));
            if i + 1 < self.records.len() {
                blocks.push(json!({ "type": "divider" }));
            }
        }
        blocks
    }

    /// One heading embed followed by one embed per item. Callers split into
    /// messages of at most 10 embeds.
    pub fn render_discord_embeds(&self) -> Vec<Value> {
        let description = if self.is_empty() {
            EMPTY_DIGEST_TEXT.to_string()
        } else {
            format!("**{}** relevant items", self.item_count)
        };
        let mut embeds = vec![json!({
            "title": clip(&self.heading(), DISCORD_TITLE_MAX_CHARS),
            "description": description,
            "color": DISCORD_COLOR,
            "timestamp": self.generated_at.to_rfc3339(),
        })];
        for (i, r) in self.records.iter().enumerate() {
            let mut e = json!({
                "title": clip(&format!("{}. {}", i + 1, r.display_title), DISCORD_TITLE_MAX_CHARS),
                "description": clip(&r.summary, DISCORD_DESCRIPTION_MAX_CHARS),
                "footer": { "text": format!("{} {}", r.record.source_kind.emoji(), meta_line(r).unwrap_or_else(|| r.tag.clone())) },
            });
            if let Some(url) = &r.record.url {
                e["url"] = json!(url);
            }
            if let Some(ts) = r.record.timestamp {
                e["timestamp"] = json!(ts.to_rfc3339());
            }
            embeds.push(e);
        }
        embeds
    }
}

/// "X Post · twitter_hashtag · @handle"
fn meta_line(r: &EnrichedRecord) -> Option<String> {
    let mut parts = vec![r.tag.clone()];
    if !r.record.source.is_empty() {
        parts.push(r.record.source.clone());
    }
    if let Some(a) = &r.record.author {
        parts.push(a.clone());
    }
    (parts.len() > 1).then(|| parts.join(" · "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::assemble;
    use crate::ingest::types::{NormalizedRecord, SourceKind};
    use chrono::{TimeZone, Utc};

    fn er(id: &str, kind: SourceKind, title: &str, url: Option<&str>) -> EnrichedRecord {
        EnrichedRecord::fallback(
            NormalizedRecord {
                id: id.into(),
                source_kind: kind,
                source: "Google Alerts".into(),
                title: title.into(),
                body: "First sentence. Second sentence. Third.".into(),
                url: url.map(str::to_string),
                author: None,
                timestamp: None,
            },
            "disabled",
        )
    }

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 9, 45, 0).unwrap()
    }

    #[test]
    fn text_layout() {
        let d = assemble(
            vec![
                er("1", SourceKind::Article, "Firms leave Delaware", Some("https://a.test/x")),
                er("2", SourceKind::XPost, "Tweet about DExit", None),
            ],
            at(),
            "Leave Delaware Daily Digest",
        );
        let expected = "Leave Delaware Daily Digest - March 07, 2025\n\
                        2 items\n\
                        \n\
                        1. [Article] Firms leave Delaware\n   First sentence. Second sentence.\n   https://a.test/x\n\n\
                        2. [X Post] Tweet about DExit\n   First sentence. Second sentence.\n\n";
        assert_eq!(d.render_text(), expected);
    }

    #[test]
    fn empty_renderings_say_so() {
        let d = assemble(Vec::new(), at(), "Digest");
        assert!(d.render_text().ends_with("No relevant items found today.\n"));
        assert!(d.render_html().contains("No relevant items found today."));
        assert_eq!(d.render_slack_blocks().len(), 3);
        assert_eq!(d.render_discord_embeds().len(), 1);
    }

    #[test]
    fn html_escapes_fields() {
        let d = assemble(
            vec![er("1", SourceKind::Article, "<b>A & B</b>", Some("https://a.test/?q=\"x\""))],
            at(),
            "Digest",
        );
        let html = d.render_html();
        assert!(html.contains("&lt;b&gt;A &amp; B&lt;/b&gt;"));
        assert!(!html.contains("<b>A"));
        assert!(html.contains("q=&quot;x&quot;"));
    }

    #[test]
    fn slack_blocks_respect_limit() {
        let recs = (0..40)
            .map(|i| er(&i.to_string(), SourceKind::LinkedIn, "LinkedIn post title", None))
            .collect();
        let blocks = assemble(recs, at(), "Digest").render_slack_blocks();
        assert!(blocks.len() <= SLACK_MAX_BLOCKS);
        let last = blocks.last().unwrap().to_string();
        assert!(last.contains("more items"));
    }

    #[test]
    fn discord_embeds_carry_items() {
        let d = assemble(
            vec![er("1", SourceKind::Article, "Firms leave Delaware", Some("https://a.test/x"))],
            at(),
            "Digest",
        );
        let embeds = d.render_discord_embeds();
        assert_eq!(embeds.len(), 2);
        assert_eq!(embeds[1]["url"], "https://a.test/x");
        assert_eq!(embeds[1]["title"], "1. Firms leave Delaware");
    }
}
