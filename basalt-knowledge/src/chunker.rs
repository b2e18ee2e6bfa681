use crate::errors::{VaultError, VaultResult};

/// A contiguous slice of a document body produced for fine-grained
/// retrieval. Offsets are byte offsets into the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Excerpt {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Reject invalid window parameters before any I/O happens.
pub fn validate_window(excerpt_size: usize, excerpt_overlap: usize) -> VaultResult<()> {
    if excerpt_size == 0 || excerpt_overlap >= excerpt_size {
        return Err(VaultError::InvalidConfiguration {
            size: excerpt_size,
            overlap: excerpt_overlap,
        });
    }
    Ok(())
}

/// Split text into overlapping windows of `excerpt_size` whitespace tokens,
/// stepping by `excerpt_size - excerpt_overlap` tokens. The final window may
/// be shorter and is still emitted.
pub fn chunk_text(
    text: &str,
    excerpt_size: usize,
    excerpt_overlap: usize,
) -> VaultResult<Vec<Excerpt>> {
    validate_window(excerpt_size, excerpt_overlap)?;

    let tokens = token_spans(text);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let step = excerpt_size - excerpt_overlap;
    let mut excerpts = Vec::new();
    let mut window_start = 0usize;

    loop {
        let window_end = (window_start + excerpt_size).min(tokens.len());
        let start = tokens[window_start].0;
        let end = tokens[window_end - 1].1;
        excerpts.push(Excerpt {
            text: text[start..end].to_string(),
            start,
            end,
        });
        if window_end == tokens.len() {
            break;
        }
        window_start += step;
    }

    Ok(excerpts)
}

/// Byte spans of whitespace-separated tokens.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(begin) = start.take() {
                spans.push((begin, idx));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        spans.push((begin, text.len()));
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn token_count(excerpt: &Excerpt) -> usize {
        excerpt.text.split_whitespace().count()
    }

    #[test]
    fn window_math_on_1200_tokens() {
        let text = words(1200);
        let excerpts = chunk_text(&text, 500, 100).expect("chunk");
        assert_eq!(excerpts.len(), 3);
        assert_eq!(token_count(&excerpts[0]), 500);
        assert_eq!(token_count(&excerpts[1]), 500);
        assert_eq!(token_count(&excerpts[2]), 400);
        assert!(excerpts[0].text.starts_with("w0 "));
        assert!(excerpts[1].text.starts_with("w400 "));
        assert!(excerpts[2].text.starts_with("w800 "));
        assert!(excerpts[2].text.ends_with("w1199"));
    }

    #[test]
    fn short_text_yields_one_window() {
        let excerpts = chunk_text("alpha beta gamma", 500, 100).expect("chunk");
        assert_eq!(excerpts.len(), 1);
        assert_eq!(excerpts[0].start, 0);
        assert_eq!(excerpts[0].end, 16);
    }

    #[test]
    fn offsets_slice_back_into_source() {
        let text = words(50);
        for excerpt in chunk_text(&text, 8, 3).expect("chunk") {
            assert_eq!(&text[excerpt.start..excerpt.end], excerpt.text);
        }
    }

    #[test]
    fn final_short_window_is_emitted() {
        let text = words(10);
        let excerpts = chunk_text(&text, 4, 1).expect("chunk");
        // steps of 3: [0,4) [3,7) [6,10) — last lands exactly, then done
        assert_eq!(excerpts.len(), 3);
        let text = words(11);
        let excerpts = chunk_text(&text, 4, 1).expect("chunk");
        assert_eq!(excerpts.len(), 4);
        assert_eq!(token_count(&excerpts[3]), 2);
    }

    #[test]
    fn empty_text_yields_no_windows() {
        assert!(chunk_text("   \n\t ", 10, 2).expect("chunk").is_empty());
    }

    #[test]
    fn overlap_must_stay_below_size() {
        assert!(matches!(
            chunk_text("a b c", 10, 10),
            Err(VaultError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            chunk_text("a b c", 0, 0),
            Err(VaultError::InvalidConfiguration { .. })
        ));
    }
}
