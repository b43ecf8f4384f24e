//! Binds the named tensors inside a [`minilm_base::WeightContainer`] to the
//! fixed shape of this architecture. Tensor names here are bit-exact
//! matches to the `transformers` checkpoint this model was distilled from
//! (`embeddings.word_embeddings.weight`, `encoder.layer.{i}.attention...`),
//! not an invention of this crate.

use minilm_base::{Result, TensorSource, NUM_LAYERS};
use tensor::Tensor;

/// The three embedding tables plus the embedding-stage layer norm.
pub struct Embeddings {
    pub word: Tensor,     // [V, H]
    pub position: Tensor, // [P, H]
    pub token_type: Tensor, // [T, H]
    pub ln_gamma: Tensor, // [H]
    pub ln_beta: Tensor,  // [H]
}

/// A dense projection plus the layer norm applied to its residual sum, used
/// both for the attention output and the FFN output (the `output_layer_t`
/// struct in the original).
pub struct OutputLayer {
    pub weight: Tensor,   // [H, H] or [H, I]
    pub bias: Tensor,     // [H]
    pub ln_gamma: Tensor, // [H]
    pub ln_beta: Tensor,  // [H]
}

/// One encoder block's weights: Q/K/V projections, the attention output
/// dense+LN, the GELU intermediate dense, and the second output dense+LN.
pub struct EncoderLayer {
    pub query: Tensor,
    pub query_bias: Tensor,
    pub key: Tensor,
    pub key_bias: Tensor,
    pub value: Tensor,
    pub value_bias: Tensor,
    pub attention_output: OutputLayer,
    pub intermediate_weight: Tensor, // [I, H]
    pub intermediate_bias: Tensor,   // [I]
    pub output: OutputLayer,
}

/// The full bound weight set: embeddings plus six encoder layers.
pub struct ModelWeights {
    pub embeddings: Embeddings,
    pub layers: [EncoderLayer; NUM_LAYERS],
}

impl ModelWeights {
    /// Looks up every tensor this architecture needs by its canonical name.
    /// Fails with [`ModelError::Weights`] (via `TensorSource::get`) the
    /// moment any single tensor is missing — there is no partial model.
    pub fn bind(source: &impl TensorSource) -> Result<ModelWeights> {
        let embeddings = Embeddings {
            word: source.get("embeddings.word_embeddings.weight")?,
            position: source.get("embeddings.position_embeddings.weight")?,
            token_type: source.get("embeddings.token_type_embeddings.weight")?,
            ln_gamma: source.get("embeddings.LayerNorm.weight")?,
            ln_beta: source.get("embeddings.LayerNorm.bias")?,
        };

        let layers = (0..NUM_LAYERS)
            .map(|i| EncoderLayer::bind(source, i))
            .collect::<Result<Vec<_>>>()?;
        let layers: [EncoderLayer; NUM_LAYERS] = layers
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly NUM_LAYERS entries were pushed above"));

        log::debug!("minilm-model: bound embeddings + {NUM_LAYERS} encoder layers");
        Ok(ModelWeights { embeddings, layers })
    }
}

impl EncoderLayer {
    fn bind(source: &impl TensorSource, i: usize) -> Result<EncoderLayer> {
        let p = |suffix: &str| format!("encoder.layer.{i}.{suffix}");
        Ok(EncoderLayer {
            query: source.get(&p("attention.self.query.weight"))?,
            query_bias: source.get(&p("attention.self.query.bias"))?,
            key: source.get(&p("attention.self.key.weight"))?,
            key_bias: source.get(&p("attention.self.key.bias"))?,
            value: source.get(&p("attention.self.value.weight"))?,
            value_bias: source.get(&p("attention.self.value.bias"))?,
            attention_output: OutputLayer {
                weight: source.get(&p("attention.output.dense.weight"))?,
                bias: source.get(&p("attention.output.dense.bias"))?,
                ln_gamma: source.get(&p("attention.output.LayerNorm.weight"))?,
                ln_beta: source.get(&p("attention.output.LayerNorm.bias"))?,
            },
            intermediate_weight: source.get(&p("intermediate.dense.weight"))?,
            intermediate_bias: source.get(&p("intermediate.dense.bias"))?,
            output: OutputLayer {
                weight: source.get(&p("output.dense.weight"))?,
                bias: source.get(&p("output.dense.bias"))?,
                ln_gamma: source.get(&p("output.LayerNorm.weight"))?,
                ln_beta: source.get(&p("output.LayerNorm.bias"))?,
            },
        })
    }
}
