use passagedb_core::{Chunker, ChunkingConfig, Document};

fn paper(doc_id: &str, sentences: usize) -> Document {
    let body = (0..sentences)
        .map(|i| format!("Retrieval sentence number {i} talks about sparse and dense indexes."))
        .collect::<Vec<_>>()
        .join(" ");
    let mut doc = Document::new(doc_id, format!("Paper {doc_id}"), body);
    doc.authors = vec!["Ada Lovelace".into()];
    doc
}

#[test]
fn chunk_batch_keeps_documents_apart() {
    let chunker = Chunker::new(ChunkingConfig {
        chunk_size_tokens: 64,
        chunk_overlap_tokens: 16,
        min_chunk_length: 40,
        by_sections: false,
    })
    .expect("config");
    let docs = vec![paper("a", 30), paper("b", 3)];
    let chunks = chunker.chunk_batch(&docs);

    let from_a: Vec<_> = chunks.iter().filter(|c| c.doc_id == "a").collect();
    let from_b: Vec<_> = chunks.iter().filter(|c| c.doc_id == "b").collect();
    assert!(from_a.len() > 1, "long document is split");
    assert_eq!(from_b.len(), 1, "short document stays whole");
    assert_eq!(from_b[0].chunk_id, "b_chunk_0");
    for c in &chunks {
        assert_eq!(c.metadata.get("authors").map(String::as_str), Some("Ada Lovelace"));
        assert!(c.char_len() <= 256 || !c.text.contains(". "), "only single sentences may exceed the window");
    }
}

#[test]
fn chunk_ids_are_unique_per_document() {
    let chunker = Chunker::new(ChunkingConfig { min_chunk_length: 10, chunk_size_tokens: 32, chunk_overlap_tokens: 8, by_sections: false })
        .expect("config");
    let chunks = chunker.chunk_document(&paper("x", 40));
    let mut ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), chunks.len());
}

#[test]
fn by_sections_flag_switches_strategy() {
    let mut doc = paper("s", 4);
    doc.body = format!("Abstract\n{}\n\n1. Introduction\n{}", doc.body, doc.body);
    let chunker = Chunker::new(ChunkingConfig { min_chunk_length: 20, by_sections: true, ..ChunkingConfig::default() }).expect("config");
    let chunks = chunker.chunk_document(&doc);
    let sections: Vec<&str> = chunks.iter().map(|c| c.section()).collect();
    assert_eq!(sections, vec!["Abstract", "1. Introduction"]);
    assert_eq!(chunks[1].chunk_id, "s_sec1");
}
