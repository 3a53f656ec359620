use launchrank_core::config::{EmbeddingBackend, EmbeddingSettings};
use launchrank_core::traits::Embedder;
use launchrank_embed::{embed_or_zero, get_default_embedder, CachedEmbedder, HashedEmbedder};

struct Failing;

impl Embedder for Failing {
    fn embedder_id(&self) -> &str { "failing" }
    fn dim(&self) -> usize { 8 }
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> { anyhow::bail!("offline") }
}

#[test]
fn hashed_embedder_is_deterministic_and_normalized() {
    let embedder = HashedEmbedder::new(64);
    let texts = vec!["open github".to_string(), "open github".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");

    assert_eq!(embs[0].len(), 64);
    let norm: f32 = embs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert_eq!(embs[0], embs[1]);
    assert_eq!(embedder.embedder_id(), "hashed:xxh64:d64");
}

#[test]
fn hashed_embedder_separates_different_keys() {
    let embedder = HashedEmbedder::new(128);
    let a = embedder.embed("git status").unwrap();
    let b = embedder.embed("git status").unwrap();
    let c = embedder.embed("open calendar").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn empty_text_maps_to_zero_vector() {
    let embedder = HashedEmbedder::new(16);
    let v = embedder.embed("").unwrap();
    assert_eq!(v, vec![0.0; 16]);
    let v = embedder.embed("  -- ").unwrap();
    assert!(v.iter().all(|x| *x == 0.0));
}

#[test]
fn cached_embedder_memoises_per_text() {
    let embedder = CachedEmbedder::new(HashedEmbedder::new(32));
    let first = embedder.embed("ls").unwrap();
    let again = embedder.embed("ls").unwrap();
    embedder.embed("pwd").unwrap();
    assert_eq!(first, again);
    assert_eq!(embedder.cached_len(), 2);
}

#[test]
fn failing_provider_falls_back_to_zero() {
    assert_eq!(embed_or_zero(&Failing, "anything"), vec![0.0; 8]);
}

#[test]
fn default_embedder_uses_hashed_backend() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Hashed, dim: 24, ..Default::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 24);
    assert_eq!(embedder.embed("hello world").unwrap().len(), 24);
}
