//! Semantic search with the real sentence embedder.
//!
//! These tests require the all-MiniLM-L6-v2 model (~80MB download on first run).
//! Run with:
//!   cargo test -p e2e-tests --test semantic_search_test -- --ignored --nocapture

use std::sync::{Arc, OnceLock};

use pretty_assertions::assert_eq;

use e2e_tests::TestHarness;
use vecmem_embeddings::{CandleEmbedder, EmbeddingModel};

/// Loaded once and shared by every test in this file.
static EMBEDDER: OnceLock<Arc<CandleEmbedder>> = OnceLock::new();

fn get_embedder() -> Arc<CandleEmbedder> {
    EMBEDDER
        .get_or_init(|| {
            let embedder =
                CandleEmbedder::load_default().expect("Failed to load embedding model");
            Arc::new(embedder)
        })
        .clone()
}

fn harness() -> TestHarness {
    let embedder = get_embedder();
    let dimension = embedder.dimension();
    TestHarness::with_embedder(embedder, dimension)
}

#[test]
#[ignore = "requires model download (~80MB on first run)"]
fn test_cat_dog_semantic() {
    let harness = harness();
    let service = harness.open();

    assert!(service.add_text("the cat sat").ok);
    assert!(service.add_text("a dog ran").ok);

    let response = service.search("kitten", 1).unwrap();
    assert_eq!(response.matches.len(), 1);
    assert_eq!(response.matches[0].text, "the cat sat");
    assert_eq!(response.matches[0].id, 1);
}

#[test]
#[ignore = "requires model download (~80MB on first run)"]
fn test_topic_groups_rank_first() {
    let harness = harness();
    let service = harness.open();

    let rust = [
        "Rust ownership system ensures memory safety without garbage collection",
        "The borrow checker enforces ownership and borrowing rules statically",
    ];
    let pasta = [
        "Italian pasta recipes include classic carbonara and amatriciana",
        "Making fresh pasta dough requires flour eggs and olive oil",
    ];
    for text in rust.iter().chain(pasta.iter()) {
        assert!(service.add_text(text).ok);
    }

    let response = service
        .search("how does Rust manage memory and references", 2)
        .unwrap();
    let texts: Vec<&str> = response.matches.iter().map(|m| m.text.as_str()).collect();
    assert!(texts.iter().all(|t| rust.contains(t)), "got {texts:?}");

    let response = service.search("cooking noodles for dinner", 1).unwrap();
    assert!(pasta.contains(&response.matches[0].text.as_str()));
}
