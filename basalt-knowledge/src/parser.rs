use regex::Regex;

use crate::errors::{VaultError, VaultResult};

/// Longest context string recorded per link occurrence.
const CONTEXT_CAP: usize = 120;

/// A wikilink occurrence as scanned from document text, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLink {
    /// 1-based line number.
    pub line: usize,
    pub target: String,
    pub alias: Option<String>,
    pub context: String,
}

/// Split raw file text into an optional TOML front-matter table and the
/// body. A document without a leading `+++` delimiter has no front matter;
/// an opened-but-unterminated block is an error.
pub fn split_front_matter(raw: &str) -> VaultResult<(Option<toml::Table>, String)> {
    let Some(rest) = raw.strip_prefix("+++\n").or_else(|| {
        (raw == "+++").then_some("")
    }) else {
        return Ok((None, raw.to_string()));
    };

    let mut front_lines = Vec::new();
    let mut lines = rest.lines();
    for line in lines.by_ref() {
        if line.trim_end() == "+++" {
            let front: toml::Table = toml::from_str(&front_lines.join("\n"))?;
            let mut body = lines.collect::<Vec<_>>().join("\n");
            if rest.ends_with('\n') && !body.is_empty() {
                body.push('\n');
            }
            let body = body.strip_prefix('\n').unwrap_or(&body).to_string();
            return Ok((Some(front), body));
        }
        front_lines.push(line);
    }

    Err(VaultError::InvalidFrontMatter(
        "unterminated front matter".to_string(),
    ))
}

/// Render a document back to file form: front-matter block (when present),
/// a blank separator line, then the body verbatim.
pub fn render_document(front: Option<&toml::Table>, body: &str) -> VaultResult<String> {
    match front {
        Some(table) => {
            let mut rendered = toml::to_string(table)?;
            if !rendered.ends_with('\n') {
                rendered.push('\n');
            }
            Ok(format!("+++\n{rendered}+++\n\n{body}"))
        }
        None => Ok(body.to_string()),
    }
}

/// Scan body text for `[[Target]]` / `[[Target|Alias]]` links, recording
/// line numbers and a trimmed context snippet per occurrence.
pub fn extract_links(body: &str) -> Vec<RawLink> {
    let pattern = Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").expect("regex");
    let mut links = Vec::new();

    for (idx, line) in body.lines().enumerate() {
        for cap in pattern.captures_iter(line) {
            let target = cap
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            if target.is_empty() {
                continue;
            }
            links.push(RawLink {
                line: idx + 1,
                target,
                alias: cap.get(2).map(|m| m.as_str().trim().to_string()),
                context: cap_context(line.trim()),
            });
        }
    }

    links
}

fn cap_context(line: &str) -> String {
    if line.len() <= CONTEXT_CAP {
        return line.to_string();
    }
    let mut end = CONTEXT_CAP;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_front_matter_and_body() {
        let raw = "+++\ntitle = \"Graph Theory\"\ntags = [\"math\"]\n+++\n\nBody text here.\n";
        let (front, body) = split_front_matter(raw).expect("split");
        let front = front.expect("front matter");
        assert_eq!(front["title"].as_str(), Some("Graph Theory"));
        assert_eq!(body, "Body text here.\n");
    }

    #[test]
    fn body_without_front_matter_passes_through() {
        let raw = "Just text with [[A Link]].\n";
        let (front, body) = split_front_matter(raw).expect("split");
        assert!(front.is_none());
        assert_eq!(body, raw);
    }

    #[test]
    fn unterminated_front_matter_is_an_error() {
        let raw = "+++\ntitle = \"oops\"\n\nno closing delimiter\n";
        assert!(matches!(
            split_front_matter(raw),
            Err(VaultError::InvalidFrontMatter(_))
        ));
    }

    #[test]
    fn render_round_trips() {
        let raw = "+++\ntitle = \"Note\"\n+++\n\nSome body.\n";
        let (front, body) = split_front_matter(raw).expect("split");
        let rendered = render_document(front.as_ref(), &body).expect("render");
        let (front2, body2) = split_front_matter(&rendered).expect("re-split");
        assert_eq!(front, front2);
        assert_eq!(body, body2);
    }

    #[test]
    fn extracts_links_with_lines_and_aliases() {
        let body = "Intro line.\nSee [[Graph Theory]] and [[BFS|breadth-first]].\n\nLater: [[Graph Theory]] again.\n";
        let links = extract_links(body);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].line, 2);
        assert_eq!(links[0].target, "Graph Theory");
        assert_eq!(links[1].alias.as_deref(), Some("breadth-first"));
        assert_eq!(links[2].line, 4);
        assert!(links[0].context.contains("[[Graph Theory]]"));
    }

    #[test]
    fn extraction_is_idempotent() {
        let body = "A [[B]] then [[C|see]].";
        assert_eq!(extract_links(body), extract_links(body));
    }
}
