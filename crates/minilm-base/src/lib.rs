//! Architecture constants and loading plumbing shared by every crate above
//! `tensor`/`weights`/`tokenizer`. This crate knows nothing about the
//! forward pass itself (that's `minilm-model`) — it owns the fixed shape of
//! the problem (hidden size, head count, sequence length) and the glue that
//! turns two file paths into a bound set of weights plus a tokenizer.

pub mod error;

use std::path::Path;

pub use error::{ModelError, Result};
pub use tokenizer::{TokenizerError, WordpieceTokenizer};
pub use weights::{WeightContainer, WeightsError};

/// Hidden size of every encoder tensor, `H`.
pub const HIDDEN_SIZE: usize = 384;
/// Width of the GELU feed-forward intermediate layer, `I`.
pub const INTERMEDIATE_SIZE: usize = 1536;
/// Number of self-attention heads, `N`.
pub const NUM_HEADS: usize = 12;
/// Per-head width, `D = H / N`.
pub const HEAD_SIZE: usize = HIDDEN_SIZE / NUM_HEADS;
/// Number of stacked encoder layers.
pub const NUM_LAYERS: usize = 6;
/// Fixed, padded sequence length, `L`. Inputs that tokenize past this are a
/// hard error, never truncated.
pub const MAX_TOKENS: usize = 256;
/// `epsilon` used by every layer norm in this model.
pub const LAYER_NORM_EPS: f32 = 1e-12;

/// A source of named, bound-by-name tensors a model crate can pull weights
/// from. Generalizes `llm-base`'s `TensorLoader` trait (which abstracts
/// over mmap vs. read-into-context) down to this workspace's single
/// always-resident-in-memory backing: a `WeightContainer`.
pub trait TensorSource {
    /// Fetches the f32 tensor named `name`, or a [`ModelError`] if it is
    /// absent or not f32.
    fn get(&self, name: &str) -> Result<tensor::Tensor>;
}

impl TensorSource for WeightContainer {
    fn get(&self, name: &str) -> Result<tensor::Tensor> {
        Ok(WeightContainer::get(self, name)?)
    }
}

/// Owns the two pieces of state a session needs for its whole lifetime: the
/// weight container (which keeps every tensor's backing buffer alive) and
/// the tokenizer (whose trie is read-only after construction). Tensor
/// references bound out of `weights` must not outlive this struct.
pub struct ModelAssets {
    weights: WeightContainer,
    tokenizer: WordpieceTokenizer,
}

impl ModelAssets {
    /// Opens the weight container and builds the tokenizer from disk.
    /// Fails immediately if either file is missing or malformed — there is
    /// no partial-success state.
    pub fn load<P: AsRef<Path>>(tbf_path: P, vocab_path: P) -> Result<ModelAssets> {
        let weights = WeightContainer::open(tbf_path)?;
        log::info!("minilm-base: loaded {} weight tensors", weights.len());
        let tokenizer = WordpieceTokenizer::from_vocab_file(vocab_path)?;
        Ok(ModelAssets { weights, tokenizer })
    }

    pub fn weights(&self) -> &WeightContainer {
        &self.weights
    }

    pub fn tokenizer(&self) -> &WordpieceTokenizer {
        &self.tokenizer
    }

    /// Tokenizes `text` and pads the id sequence up to [`MAX_TOKENS`] with
    /// zero. Fails with [`ModelError::TokenLimitExceeded`] if the pre-pad
    /// token count already exceeds the limit — inputs are never truncated.
    pub fn tokenize_padded(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = self.tokenizer.encode(text)?;
        if ids.len() > MAX_TOKENS {
            return Err(ModelError::TokenLimitExceeded {
                actual: ids.len(),
                max: MAX_TOKENS,
            });
        }
        ids.resize(MAX_TOKENS, 0);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tokenize_padded_pads_to_max_tokens() {
        // Build a vocab where [CLS]=101, [SEP]=102, and "hi" sits at some id.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut lines: Vec<String> = vec!["[PAD]".into(), "[UNK]".into()];
        while lines.len() < 101 {
            // one "##"-prefixed entry so the tokenizer's continuation
            // subtree exists; "hi" never needs it since it matches whole.
            let idx = lines.len();
            lines.push(if idx == 50 { "##zzfiller50".into() } else { format!("zzfiller{idx}") });
        }
        lines.push("[CLS]".into()); // 101
        lines.push("[SEP]".into()); // 102
        lines.push("hi".into()); // 103
        for l in &lines {
            writeln!(file, "{l}").unwrap();
        }
        file.flush().unwrap();

        let tokenizer = WordpieceTokenizer::from_vocab_file(file.path()).unwrap();
        let ids = tokenizer.encode("hi").unwrap();
        assert_eq!(ids, vec![101, 103, 102]);

        let assets = ModelAssets {
            weights: {
                // a zero-tensor container isn't needed for tokenize_padded;
                // construct the lightest possible one via a throwaway TBF.
                let mut tbf = tempfile::NamedTempFile::new().unwrap();
                tbf.write_all(b"TBF1").unwrap();
                tbf.write_all(&0u64.to_le_bytes()).unwrap();
                tbf.flush().unwrap();
                WeightContainer::open(tbf.path()).unwrap()
            },
            tokenizer,
        };

        let padded = assets.tokenize_padded("hi").unwrap();
        assert_eq!(padded.len(), MAX_TOKENS);
        assert_eq!(&padded[0..3], &[101, 103, 102]);
        assert!(padded[3..].iter().all(|&id| id == 0));
    }

    #[test]
    fn tokenize_padded_rejects_too_many_tokens() {
        // vocab where every single ASCII letter is its own one-byte token,
        // so a long run of distinct letters yields one token each.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut lines: Vec<String> = vec!["[PAD]".into(), "[UNK]".into()];
        while lines.len() < 101 {
            let idx = lines.len();
            lines.push(if idx == 50 { "##zzfiller50".into() } else { format!("zzfiller{idx}") });
        }
        lines.push("[CLS]".into());
        lines.push("[SEP]".into());
        for c in b'a'..=b'z' {
            lines.push((c as char).to_string());
        }
        for l in &lines {
            writeln!(file, "{l}").unwrap();
        }
        file.flush().unwrap();

        let tokenizer = WordpieceTokenizer::from_vocab_file(file.path()).unwrap();
        // 286 whitespace-separated single-letter words -> 286 whole-word
        // matches (one trie hit each, no continuation needed) + CLS/SEP.
        let long_word: String = (b'a'..=b'z')
            .cycle()
            .take(286)
            .map(|c| (c as char).to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let ids = tokenizer.encode(&long_word).unwrap();
        assert!(ids.len() > MAX_TOKENS);

        let assets = ModelAssets {
            weights: {
                let mut tbf = tempfile::NamedTempFile::new().unwrap();
                tbf.write_all(b"TBF1").unwrap();
                tbf.write_all(&0u64.to_le_bytes()).unwrap();
                tbf.flush().unwrap();
                WeightContainer::open(tbf.path()).unwrap()
            },
            tokenizer,
        };

        assert!(matches!(
            assets.tokenize_padded(&long_word),
            Err(ModelError::TokenLimitExceeded { .. })
        ));
    }
}
