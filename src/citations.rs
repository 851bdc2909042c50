use std::collections::{BTreeSet, HashMap};

use crate::models::{Citation, PassageRecord};

const KNOWN_EXTENSIONS: &[&str] = &["pdf", "docx", "md", "txt"];
const SEPARATORS: &[char] = &['_'];
const CITATION_HEADER: &str = "📚 References consulted:";
const NO_PAGES: &str = "N/A";

/// User-facing name of a source document: file name without a known
/// extension, separators turned into spaces.
pub fn display_name(source_document: &str) -> String {
    let file_name = source_document
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(source_document)
        .trim();

    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext))
            if KNOWN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known)) =>
        {
            stem
        }
        _ => file_name,
    };

    stem.replace(SEPARATORS, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Groups passages by document in first-seen order and unions their pages.
pub fn aggregate(passages: &[PassageRecord]) -> Vec<Citation> {
    let mut order: Vec<Citation> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for passage in passages {
        if passage.source_document.trim().is_empty() {
            continue;
        }
        let name = display_name(&passage.source_document);
        if name.is_empty() {
            continue;
        }

        match positions.get(&name) {
            Some(&index) => {
                order[index]
                    .pages
                    .extend(passage.page_numbers.iter().copied());
            }
            None => {
                positions.insert(name.clone(), order.len());
                order.push(Citation {
                    display_name: name,
                    pages: passage.page_numbers.iter().copied().collect::<BTreeSet<_>>(),
                });
            }
        }
    }

    order
}

pub fn aggregate_capped(passages: &[PassageRecord], max: Option<usize>) -> Vec<Citation> {
    let mut citations = aggregate(passages);
    if let Some(max) = max {
        citations.truncate(max);
    }
    citations
}

pub fn format_pages(pages: &BTreeSet<u32>) -> String {
    if pages.is_empty() {
        return NO_PAGES.to_string();
    }
    pages
        .iter()
        .map(|page| page.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Plain-text reference block, or `None` when there is nothing to cite.
pub fn render_citation_block(citations: &[Citation]) -> Option<String> {
    if citations.is_empty() {
        return None;
    }

    let mut block = format!("{CITATION_HEADER}\n\n");
    for citation in citations {
        block.push_str(&format!(
            "• {} (p. {})\n",
            citation.display_name,
            format_pages(&citation.pages)
        ));
    }
    Some(block)
}
