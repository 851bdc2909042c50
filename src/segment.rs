use crate::error::{DeliveryError, DeliveryResult};
use crate::markup::{open_contexts, OpenContexts, BOLD, ITALIC};
use crate::models::{MessageChunk, SanitizedText};

pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

// Room left in every split chunk for delimiters carried across the boundary.
const CARRY_RESERVE: usize = 12;

/// Splits sanitized text into chunks of at most `max_chunk_size` characters,
/// breaking only between paragraphs.
///
/// A paragraph that alone exceeds the cap is emitted unsplit as its own chunk.
pub fn segment(text: &SanitizedText, max_chunk_size: usize) -> DeliveryResult<Vec<MessageChunk>> {
    if max_chunk_size == 0 {
        return Err(DeliveryError::PipelineFailure(
            "max chunk size must be positive".to_string(),
        ));
    }

    if text.char_len() <= max_chunk_size {
        return Ok(vec![MessageChunk {
            index: 0,
            text: text.clone(),
            is_final: true,
        }]);
    }

    let budget = max_chunk_size.saturating_sub(CARRY_RESERVE).max(1);
    let mut bodies = pack_paragraphs(text.as_str(), budget);
    if bodies.is_empty() {
        bodies.push(text.as_str().to_string());
    }

    let total = bodies.len();
    let mut carry = OpenContexts::default();
    let mut chunks = Vec::with_capacity(total);

    for (index, body) in bodies.into_iter().enumerate() {
        let mut chunk_text = carry.reopening();
        join_delimited(&mut chunk_text, &body);

        let open = open_contexts(&chunk_text);
        join_delimited(&mut chunk_text, &open.closing());
        carry = OpenContexts {
            link: false,
            ..open
        };

        let chars = chunk_text.chars().count();
        if chars > max_chunk_size {
            tracing::warn!(
                index,
                chars,
                max_chunk_size,
                "single paragraph exceeds the message cap; sending it unsplit"
            );
        }

        chunks.push(MessageChunk {
            index,
            text: SanitizedText::new(chunk_text),
            is_final: index + 1 == total,
        });
    }

    Ok(chunks)
}

/// Appends `tail`, dropping an unescaped emphasis delimiter at the end of
/// `head` together with the same delimiter at the start of `tail`.
fn join_delimited(head: &mut String, tail: &str) {
    if let Some(last) = head.chars().last() {
        if (last == ITALIC || last == BOLD) && tail.starts_with(last) && !is_escaped_last(head) {
            head.pop();
            head.push_str(&tail[last.len_utf8()..]);
            return;
        }
    }
    head.push_str(tail);
}

fn is_escaped_last(text: &str) -> bool {
    let backslashes = text
        .chars()
        .rev()
        .skip(1)
        .take_while(|&c| c == '\\')
        .count();
    backslashes % 2 == 1
}

fn pack_paragraphs(text: &str, budget: usize) -> Vec<String> {
    let separator_len = PARAGRAPH_SEPARATOR.chars().count();
    let mut bodies = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in text
        .split(PARAGRAPH_SEPARATOR)
        .filter(|paragraph| !paragraph.trim().is_empty())
    {
        let len = paragraph.chars().count();
        if current.is_empty() {
            current.push_str(paragraph);
            current_len = len;
        } else if current_len + separator_len + len > budget {
            bodies.push(std::mem::take(&mut current));
            current.push_str(paragraph);
            current_len = len;
        } else {
            current.push_str(PARAGRAPH_SEPARATOR);
            current.push_str(paragraph);
            current_len += separator_len + len;
        }
    }

    if !current.is_empty() {
        bodies.push(current);
    }
    bodies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::sanitize;

    fn sanitized(text: &str) -> SanitizedText {
        SanitizedText::new(text.to_string())
    }

    #[test]
    fn short_text_is_a_single_final_chunk() {
        let chunks = segment(&sanitized("hello"), 3500).expect("segment");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert!(chunks[0].is_final);
        assert_eq!(chunks[0].text.as_str(), "hello");
    }

    #[test]
    fn three_large_paragraphs_become_three_chunks() {
        let paragraph = "a".repeat(3000);
        let text = [paragraph.as_str(); 3].join(PARAGRAPH_SEPARATOR);
        let chunks = segment(&sanitized(&text), 3500).expect("segment");

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.text.char_len() == 3000));
        assert_eq!(
            chunks.iter().map(|chunk| chunk.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(
            chunks.iter().filter(|chunk| chunk.is_final).count(),
            1
        );
        assert!(chunks[2].is_final);
    }

    #[test]
    fn small_paragraphs_are_packed_greedily() {
        let paragraphs: Vec<String> = (0..10).map(|n| format!("{n}{}", "x".repeat(99))).collect();
        let text = paragraphs.join(PARAGRAPH_SEPARATOR);
        let chunks = segment(&sanitized(&text), 350).expect("segment");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.char_len() <= 350);
        }
        let rejoined = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR);
        assert_eq!(rejoined, text);
    }

    #[test]
    fn oversized_paragraph_is_kept_whole() {
        let text = format!("intro{PARAGRAPH_SEPARATOR}{}{PARAGRAPH_SEPARATOR}outro", "y".repeat(500));
        let chunks = segment(&sanitized(&text), 100).expect("segment");

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text.char_len(), 500);
        assert!(chunks.iter().all(|chunk| !chunk.text.as_str().is_empty()));
    }

    #[test]
    fn contexts_spanning_a_boundary_are_carried() {
        let code_body = "let a = 1;\n\nlet b = 2;";
        let raw = format!("{}\n\n```\n{}\n```\n\ndone", "p".repeat(30), code_body);
        let text = sanitize(&raw);
        let chunks = segment(&text, 40).expect("segment");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                open_contexts(chunk.text.as_str()).is_empty(),
                "unbalanced chunk {:?}",
                chunk.text
            );
        }
    }

    #[test]
    fn carried_emphasis_never_doubles_at_a_boundary() {
        let raw = format!("{} _x{PARAGRAPH_SEPARATOR}_ {}", "p".repeat(30), "q".repeat(30));
        let chunks = segment(&sanitize(&raw), 40).expect("segment");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.text.as_str().contains("__"), "doubled delimiter in {:?}", chunk.text);
            assert!(open_contexts(chunk.text.as_str()).is_empty());
        }
    }

    #[test]
    fn escaped_delimiter_is_not_joined() {
        let mut head = "a \\_".to_string();
        join_delimited(&mut head, "_b");
        assert_eq!(head, "a \\__b");

        let mut head = "a _".to_string();
        join_delimited(&mut head, "_b");
        assert_eq!(head, "a b");
    }

    #[test]
    fn zero_cap_is_rejected() {
        let err = segment(&sanitized("x"), 0).unwrap_err();
        assert!(matches!(err, DeliveryError::PipelineFailure(_)));
    }

    #[test]
    fn segmentation_is_deterministic() {
        let text = sanitized(&["alpha"; 40].join(PARAGRAPH_SEPARATOR));
        assert_eq!(segment(&text, 64).unwrap(), segment(&text, 64).unwrap());
    }
}
