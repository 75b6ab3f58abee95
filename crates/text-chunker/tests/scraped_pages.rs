use ashguard_text_chunker::{reassemble, ChunkerConfig, SeparatorLevel, TextChunker};

const PAGE: &str = "Returning Home After a Fire\n\n\
Ash and debris from burned homes can contain asbestos, heavy metals such as lead and arsenic, \
and other hazardous substances. Avoid stirring up ash. Wear an N95 respirator, gloves, long \
sleeves and long pants when cleaning.\n\n\
Children and pets should not be present during cleanup. Do not use leaf blowers!\n\
Wet down ash with a gentle spray of water before sweeping. Dispose of ash in double-bagged \
plastic bags.\n\n\
Is it safe to eat produce from my garden? Wash all produce thoroughly and peel root vegetables.";

#[test]
fn scraped_page_chunks_respect_bounds_and_reassemble() {
    let chunker = TextChunker::new(ChunkerConfig::new(160, 24)).expect("valid config");
    let chunks = chunker.split(PAGE);

    assert!(chunks.len() > 2);
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 160, "oversized chunk: {chunk:?}");
    }
    assert_eq!(reassemble(&chunks, 24), PAGE);
}

#[test]
fn custom_hierarchy_without_sentence_level_cuts_on_words() {
    let config = ChunkerConfig {
        chunk_size: 80,
        chunk_overlap: 8,
        separators: vec![SeparatorLevel::new("word", &[" "])],
    };
    let chunker = TextChunker::new(config).expect("valid config");
    let chunks = chunker.split(PAGE);

    for chunk in &chunks[..chunks.len() - 1] {
        assert!(chunk.ends_with(' '), "expected word boundary: {chunk:?}");
    }
    assert_eq!(reassemble(&chunks, 8), PAGE);
}
