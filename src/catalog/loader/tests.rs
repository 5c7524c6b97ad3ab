use super::*;
use std::io::Cursor;
use std::sync::Mutex;

/// Embeds text as `[len, batch index]` and records batch sizes
struct LengthEmbedder {
    batches: Mutex<Vec<usize>>,
}

impl LengthEmbedder {
    fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }
}

impl Embedder for LengthEmbedder {
    fn model_name(&self) -> &str {
        "length"
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut batches = self.batches.lock().expect("lock");
        batches.push(texts.len());
        let batch_index = batches.len() as f32;
        Ok(texts
            .iter()
            .map(|text| vec![text.len() as f32, batch_index])
            .collect())
    }
}

fn options(dimension: usize) -> MaterializeOptions {
    MaterializeOptions {
        dimension,
        reembed: false,
        batch_size: 2,
        show_progress: false,
    }
}

#[test]
fn accepts_upstream_id_and_tag_shapes() {
    let jsonl = r#"
{"id": "a", "title": "Alpha", "category": "Books", "tags": ["x", " y "], "embedding": [1.0, 0.0]}

{"product_id": 42, "name": "Numbered", "tags": "red, blue ,,green"}
{"productId": " c ", "price": 9.5}
"#;
    let entries = parse_catalog(Cursor::new(jsonl)).expect("valid catalog");

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].product_id(), "a");
    assert_eq!(entries[0].tags(), vec!["x", "y"]);
    assert_eq!(entries[1].product_id(), "42");
    assert_eq!(entries[1].display_title(), "Numbered");
    assert_eq!(entries[1].tags(), vec!["red", "blue", "green"]);
    assert_eq!(entries[2].product_id(), "c");
    assert_eq!(entries[2].display_title(), "Product c");
    assert!(entries[2].tags().is_empty());
}

#[test]
fn malformed_line_reports_line_number() {
    let jsonl = "{\"id\": \"a\"}\n{\"id\": \n";
    let err = parse_catalog(Cursor::new(jsonl)).expect_err("second line is broken");
    assert!(matches!(err, RecError::InvalidParameter(ref msg) if msg.contains("line 2")));
}

#[test]
fn missing_or_empty_id_is_rejected() {
    assert!(parse_catalog(Cursor::new("{\"title\": \"no id\"}")).is_err());
    assert!(parse_catalog(Cursor::new("{\"id\": \"  \"}")).is_err());
}

#[test]
fn entries_with_vectors_need_no_embedder() {
    let entries = parse_catalog(Cursor::new(
        "{\"id\": \"a\", \"embedding\": [1.0, 0.0]}\n{\"id\": \"b\", \"embedding\": [0.0, 1.0]}",
    ))
    .expect("valid catalog");

    let products = materialize(entries, None, options(2)).expect("all vectors present");
    assert_eq!(products.len(), 2);
    assert_eq!(products[1].embedding, vec![0.0, 1.0]);
}

#[test]
fn missing_vectors_without_embedder_fail() {
    let entries = parse_catalog(Cursor::new("{\"id\": \"a\"}")).expect("valid catalog");
    assert!(matches!(
        materialize(entries, None, options(2)),
        Err(RecError::Embedding(_))
    ));
}

#[test]
fn missing_vectors_are_embedded_in_batches() {
    let entries = parse_catalog(Cursor::new(
        "{\"id\": \"a\"}\n{\"id\": \"b\"}\n{\"id\": \"c\"}\n{\"id\": \"d\", \"embedding\": [5.0, 5.0]}",
    ))
    .expect("valid catalog");

    let embedder = LengthEmbedder::new();
    let products = materialize(entries, Some(&embedder), options(2)).expect("embedded");

    assert_eq!(products.len(), 4);
    assert_eq!(*embedder.batches.lock().expect("lock"), vec![2, 1]);
    let d = products.iter().find(|p| p.id == "d").expect("d kept");
    assert_eq!(d.embedding, vec![5.0, 5.0]);
}

#[test]
fn reembed_ignores_file_vectors() {
    let entries = parse_catalog(Cursor::new("{\"id\": \"d\", \"embedding\": [5.0, 5.0]}"))
        .expect("valid catalog");

    let embedder = LengthEmbedder::new();
    let products = materialize(
        entries,
        Some(&embedder),
        MaterializeOptions {
            reembed: true,
            ..options(2)
        },
    )
    .expect("embedded");

    assert_eq!(products[0].embedding, vec!["Product d".len() as f32, 1.0]);
}

#[test]
fn wrong_dimension_fails_whole_import() {
    let entries = parse_catalog(Cursor::new(
        "{\"id\": \"a\", \"embedding\": [1.0, 0.0]}\n{\"id\": \"b\", \"embedding\": [1.0]}",
    ))
    .expect("valid catalog");

    assert!(matches!(
        materialize(entries, None, options(2)),
        Err(RecError::EmbeddingDimensionMismatch { ref product_id, .. }) if product_id == "b"
    ));
}

#[test]
fn embedder_output_with_wrong_dimension_fails() {
    let entries = parse_catalog(Cursor::new("{\"id\": \"a\"}")).expect("valid catalog");
    let embedder = LengthEmbedder::new();
    assert!(matches!(
        materialize(entries, Some(&embedder), options(3)),
        Err(RecError::EmbeddingDimensionMismatch { .. })
    ));
}

#[test]
fn embedding_text_uses_entry_fields() {
    let entries = parse_catalog(Cursor::new(
        "{\"id\": \"a\", \"title\": \"Lamp\", \"category\": \"Home\", \"description\": \"Bright\", \"tags\": \"desk\"}",
    ))
    .expect("valid catalog");
    assert_eq!(
        entries[0].embedding_text(),
        "Lamp. Category: Home. Tags: desk. Bright"
    );
}
