//! Splitting specification documents into extraction-sized chunks.

/// Section name used for text before the first heading.
pub const PREAMBLE: &str = "Preamble";

/// A slice of the document sent to extraction in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    /// Headings of the sections contained, in document order.
    pub sections: Vec<String>,
    pub text: String,
}

impl Chunk {
    /// The first section in the chunk.
    pub fn primary_section(&self) -> &str {
        self.sections.first().map(String::as_str).unwrap_or(PREAMBLE)
    }

    /// Resolve a section name reported by the model against this chunk.
    pub fn resolve_section(&self, reported: Option<&str>) -> String {
        let reported = reported.map(|s| s.trim().trim_start_matches('#').trim());
        match reported {
            Some(name) => self
                .sections
                .iter()
                .find(|s| s.eq_ignore_ascii_case(name))
                .cloned()
                .unwrap_or_else(|| self.primary_section().to_string()),
            None => self.primary_section().to_string(),
        }
    }
}

struct Section {
    heading: String,
    text: String,
}

/// Split a markdown document on headings, packing whole sections into chunks
/// of at most `max_chars` characters. Oversized sections are split on blank
/// lines, then on line boundaries.
pub fn chunk_document(document: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let mut pieces: Vec<(String, String)> = Vec::new();

    for section in split_sections(document) {
        if char_len(&section.text) <= max_chars {
            pieces.push((section.heading, section.text));
        } else {
            for part in split_oversized(&section.text, max_chars) {
                pieces.push((section.heading.clone(), part));
            }
        }
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut sections: Vec<String> = Vec::new();
    let mut text = String::new();

    for (heading, piece) in pieces {
        if !text.is_empty() && char_len(&text) + char_len(&piece) > max_chars {
            push_chunk(&mut chunks, std::mem::take(&mut sections), std::mem::take(&mut text));
        }
        if !sections.contains(&heading) {
            sections.push(heading);
        }
        text.push_str(&piece);
    }
    push_chunk(&mut chunks, sections, text);

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, sections: Vec<String>, text: String) {
    if text.trim().is_empty() {
        return;
    }
    chunks.push(Chunk { index: chunks.len(), sections, text });
}

fn split_sections(document: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section { heading: PREAMBLE.to_string(), text: String::new() };

    for line in document.split_inclusive('\n') {
        if let Some(heading) = heading_text(line) {
            let next = Section {
                heading,
                text: String::new(),
            };
            let finished = std::mem::replace(&mut current, next);
            if !finished.text.trim().is_empty() {
                sections.push(finished);
            }
        }
        current.text.push_str(line);
    }
    if !current.text.trim().is_empty() {
        sections.push(current);
    }

    sections
}

/// Text of a markdown ATX heading line, if it is one.
pub fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn split_oversized(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for paragraph in text.split_inclusive("\n\n") {
        if char_len(paragraph) > max_chars {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            parts.extend(split_lines(paragraph, max_chars));
            continue;
        }
        if char_len(&current) + char_len(paragraph) > max_chars {
            parts.push(std::mem::take(&mut current));
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn split_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if char_len(&current) + char_len(line) > max_chars && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        if char_len(line) > max_chars {
            // A single line longer than the budget is cut on char boundaries.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                parts.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sections_are_packed_together() {
        let doc = "# Title\nIntro.\n\n## Auth\nUsers log in.\n\n## Storage\nData in SQLite.\n";
        let chunks = chunk_document(doc, 1_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sections, vec!["Title", "Auth", "Storage"]);
        assert_eq!(chunks[0].text, doc);
    }

    #[test]
    fn test_budget_splits_on_section_boundaries() {
        let doc = "## A\naaaaaaaaaa\n## B\nbbbbbbbbbb\n";
        let chunks = chunk_document(doc, 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].sections, vec!["A"]);
        assert_eq!(chunks[1].sections, vec!["B"]);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_oversized_section_splits_on_paragraphs() {
        let doc = "## Big\nfirst paragraph here\n\nsecond paragraph here\n";
        let chunks = chunk_document(doc, 30);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.primary_section() == "Big"));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 30));
    }

    #[test]
    fn test_preamble_and_heading_parsing() {
        assert_eq!(heading_text("## Auth ##\n"), Some("Auth".to_string()));
        assert_eq!(heading_text("#hashtag"), None);
        assert_eq!(heading_text("####### seven"), None);

        let chunks = chunk_document("Loose intro text.\n# Real\nBody\n", 1_000);
        assert_eq!(chunks[0].sections, vec![PREAMBLE, "Real"]);
    }

    #[test]
    fn test_resolve_section() {
        let chunk = Chunk {
            index: 0,
            sections: vec!["Auth".into(), "Storage".into()],
            text: String::new(),
        };
        assert_eq!(chunk.resolve_section(Some("storage")), "Storage");
        assert_eq!(chunk.resolve_section(Some("## Auth")), "Auth");
        assert_eq!(chunk.resolve_section(Some("Invented")), "Auth");
        assert_eq!(chunk.resolve_section(None), "Auth");
    }

    proptest! {
        #[test]
        fn prop_chunks_respect_budget_and_lose_nothing(
            paragraphs in proptest::collection::vec("[a-z ]{0,60}", 1..20),
            max in 16usize..200,
        ) {
            let doc = paragraphs
                .iter()
                .enumerate()
                .map(|(i, p)| format!("## S{i}\n{p}\n"))
                .collect::<String>();
            let chunks = chunk_document(&doc, max);

            for chunk in &chunks {
                prop_assert!(chunk.text.chars().count() <= max);
            }
            let visible =
                |text: &str| text.chars().filter(|c| !c.is_whitespace()).collect::<String>();
            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            prop_assert_eq!(visible(&rebuilt), visible(&doc));
        }
    }
}
