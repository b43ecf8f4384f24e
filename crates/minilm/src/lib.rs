//! Small embedding engine facade: load a checkpoint and a vocabulary once,
//! then turn text into 384-dim L2-normalized sentence embeddings. This is
//! the one crate downstream code (the CLI, the FFI boundary) should depend
//! on; `minilm-base` and `minilm-model` are its implementation.

use std::path::Path;

use minilm_base::ModelAssets;
use minilm_model::bindings::ModelWeights;
use minilm_model::Encoder;
use thiserror::Error;

pub use minilm_base::HIDDEN_SIZE;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Model(#[from] minilm_base::ModelError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// A loaded model ready to embed text. Owns the weight container and
/// tokenizer for its whole lifetime; every tensor the bound [`ModelWeights`]
/// holds shares storage with `assets`, so the two must not be separated.
pub struct Session {
    assets: ModelAssets,
    encoder: Encoder,
}

impl Session {
    /// Loads weights from `tbf_path` and a WordPiece vocabulary from
    /// `vocab_path`, and binds every tensor this architecture needs.
    pub fn create<P: AsRef<Path>>(tbf_path: P, vocab_path: P) -> Result<Session> {
        let assets = ModelAssets::load(tbf_path, vocab_path)?;
        let weights = ModelWeights::bind(assets.weights())?;
        log::info!("minilm: session ready");
        Ok(Session { assets, encoder: Encoder::new(weights) })
    }

    /// Tokenizes `text`, pads it to the model's fixed sequence length, and
    /// runs the forward pass. The result is a unit-length vector unless
    /// `text` tokenizes to nothing but padding (an empty or all-whitespace
    /// input), in which case it is the zero vector.
    pub fn embed(&self, text: &str) -> Result<[f32; HIDDEN_SIZE]> {
        let ids = self.assets.tokenize_padded(text)?;
        let pooled = self.encoder.encode(&ids)?;
        let mut out = [0f32; HIDDEN_SIZE];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = pooled.get(&[i]);
        }
        Ok(out)
    }

    /// Tokenizes `text` without padding, for callers that want to inspect
    /// the raw token ID sequence rather than an embedding.
    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        self.assets
            .tokenizer()
            .encode(text)
            .map_err(minilm_base::ModelError::from)
            .map_err(SessionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minilm_base::{INTERMEDIATE_SIZE, MAX_TOKENS, NUM_LAYERS};
    use std::io::Write;

    /// Appends one f32 tensor entry (header placeholder + payload) to a
    /// growing TBF1 file, mirroring the real writer this crate never needs
    /// (weights are produced by an offline conversion step, out of scope
    /// here) but whose layout `weights::WeightContainer::open` expects.
    struct TbfBuilder {
        headers: Vec<Vec<u8>>,
        payloads: Vec<Vec<u8>>,
    }

    impl TbfBuilder {
        fn new() -> TbfBuilder {
            TbfBuilder { headers: Vec::new(), payloads: Vec::new() }
        }

        fn push(&mut self, name: &str, dims: &[usize], data: Vec<f32>) {
            let mut header = Vec::new();
            header.extend_from_slice(&(name.len() as u16).to_le_bytes());
            header.extend_from_slice(name.as_bytes());
            header.push(1); // DType::F32 tag
            header.push(dims.len() as u8);
            for &d in dims {
                header.extend_from_slice(&(d as u32).to_le_bytes());
            }
            self.headers.push(header);
            self.payloads.push(data.iter().flat_map(|v| v.to_le_bytes()).collect());
        }

        fn finish(self) -> Vec<u8> {
            let mut buf = Vec::new();
            buf.extend_from_slice(b"TBF1");
            buf.extend_from_slice(&(self.headers.len() as u64).to_le_bytes());

            let header_total: usize = self.headers.iter().map(|h| h.len() + 16).sum();
            let mut cursor = buf.len() + header_total;
            let mut offsets = Vec::with_capacity(self.payloads.len());
            for payload in &self.payloads {
                offsets.push(cursor as u64);
                cursor += payload.len();
            }

            for (i, header) in self.headers.iter().enumerate() {
                buf.extend_from_slice(header);
                buf.extend_from_slice(&offsets[i].to_le_bytes());
                buf.extend_from_slice(&(self.payloads[i].len() as u64).to_le_bytes());
            }
            for payload in &self.payloads {
                buf.extend_from_slice(payload);
            }
            buf
        }
    }

    fn ramp(dims: &[usize]) -> Vec<f32> {
        let numel: usize = dims.iter().product();
        (0..numel).map(|i| ((i % 7) as f32 - 3.0) * 0.01).collect()
    }

    fn identity_flat(n: usize) -> Vec<f32> {
        let mut data = vec![0.0f32; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        data
    }

    /// Builds a complete, architecturally valid (if semantically arbitrary)
    /// checkpoint: every tensor name `ModelWeights::bind` looks up, at the
    /// real fixed dimensions, so `Session::create` exercises the full
    /// load-and-bind path rather than a stub.
    fn write_synthetic_checkpoint(path: &std::path::Path, vocab: usize) {
        let mut b = TbfBuilder::new();
        b.push("embeddings.word_embeddings.weight", &[vocab, HIDDEN_SIZE], ramp(&[vocab, HIDDEN_SIZE]));
        b.push(
            "embeddings.position_embeddings.weight",
            &[MAX_TOKENS, HIDDEN_SIZE],
            ramp(&[MAX_TOKENS, HIDDEN_SIZE]),
        );
        b.push("embeddings.token_type_embeddings.weight", &[2, HIDDEN_SIZE], vec![0.0; 2 * HIDDEN_SIZE]);
        b.push("embeddings.LayerNorm.weight", &[HIDDEN_SIZE], vec![1.0; HIDDEN_SIZE]);
        b.push("embeddings.LayerNorm.bias", &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);

        for i in 0..NUM_LAYERS {
            let p = |suffix: &str| format!("encoder.layer.{i}.{suffix}");
            b.push(&p("attention.self.query.weight"), &[HIDDEN_SIZE, HIDDEN_SIZE], identity_flat(HIDDEN_SIZE));
            b.push(&p("attention.self.query.bias"), &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);
            b.push(&p("attention.self.key.weight"), &[HIDDEN_SIZE, HIDDEN_SIZE], identity_flat(HIDDEN_SIZE));
            b.push(&p("attention.self.key.bias"), &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);
            b.push(&p("attention.self.value.weight"), &[HIDDEN_SIZE, HIDDEN_SIZE], identity_flat(HIDDEN_SIZE));
            b.push(&p("attention.self.value.bias"), &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);
            b.push(&p("attention.output.dense.weight"), &[HIDDEN_SIZE, HIDDEN_SIZE], identity_flat(HIDDEN_SIZE));
            b.push(&p("attention.output.dense.bias"), &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);
            b.push(&p("attention.output.LayerNorm.weight"), &[HIDDEN_SIZE], vec![1.0; HIDDEN_SIZE]);
            b.push(&p("attention.output.LayerNorm.bias"), &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);
            b.push(
                &p("intermediate.dense.weight"),
                &[INTERMEDIATE_SIZE, HIDDEN_SIZE],
                ramp(&[INTERMEDIATE_SIZE, HIDDEN_SIZE]),
            );
            b.push(&p("intermediate.dense.bias"), &[INTERMEDIATE_SIZE], vec![0.0; INTERMEDIATE_SIZE]);
            b.push(
                &p("output.dense.weight"),
                &[HIDDEN_SIZE, INTERMEDIATE_SIZE],
                ramp(&[HIDDEN_SIZE, INTERMEDIATE_SIZE]),
            );
            b.push(&p("output.dense.bias"), &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);
            b.push(&p("output.LayerNorm.weight"), &[HIDDEN_SIZE], vec![1.0; HIDDEN_SIZE]);
            b.push(&p("output.LayerNorm.bias"), &[HIDDEN_SIZE], vec![0.0; HIDDEN_SIZE]);
        }

        std::fs::write(path, b.finish()).unwrap();
    }

    fn write_vocab(path: &std::path::Path) {
        let mut file = std::fs::File::create(path).unwrap();
        let mut lines: Vec<String> = vec!["[PAD]".into(), "[UNK]".into()];
        while lines.len() < 101 {
            // one "##"-prefixed entry so the tokenizer's continuation
            // subtree exists; neither "hello" nor "world" ever needs it.
            let idx = lines.len();
            lines.push(if idx == 50 { "##zzfiller50".into() } else { format!("zzfiller{idx}") });
        }
        lines.push("[CLS]".into()); // 101
        lines.push("[SEP]".into()); // 102
        lines.push("hello".into()); // 103
        lines.push("world".into()); // 104
        for l in &lines {
            writeln!(file, "{l}").unwrap();
        }
    }

    #[test]
    fn session_create_and_embed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tbf_path = dir.path().join("model.tbf");
        let vocab_path = dir.path().join("vocab.txt");
        write_synthetic_checkpoint(&tbf_path, 105);
        write_vocab(&vocab_path);

        let session = Session::create(&tbf_path, &vocab_path).unwrap();
        let embedding = session.embed("hello world").unwrap();

        let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "norm was {norm}");
    }

    #[test]
    fn session_embed_rejects_overlong_input() {
        let dir = tempfile::tempdir().unwrap();
        let tbf_path = dir.path().join("model.tbf");
        let vocab_path = dir.path().join("vocab.txt");
        write_synthetic_checkpoint(&tbf_path, 105);
        write_vocab(&vocab_path);

        let session = Session::create(&tbf_path, &vocab_path).unwrap();
        let long_text = "hello world ".repeat(200);
        assert!(matches!(
            session.embed(&long_text),
            Err(SessionError::Model(minilm_base::ModelError::TokenLimitExceeded { .. }))
        ));
    }

    #[test]
    fn session_create_fails_on_missing_file() {
        let err = Session::create(Path::new("/nonexistent/model.tbf"), Path::new("/nonexistent/vocab.txt"));
        assert!(err.is_err());
    }
}
