//! The six-layer BERT-family encoder forward pass built on top of
//! [`tensor::Tensor`] bindings: embeddings, masked self-attention, the GELU
//! feed-forward block, masked mean pooling and L2 normalization. Grounded on
//! `minilm.c`'s `minilm_embedder_forward`, `minilm_encoder_forward`, and
//! `minilm_encode`.

pub mod bindings;
pub mod nn;

use bindings::{Embeddings, EncoderLayer, ModelWeights};
use minilm_base::{Result, LAYER_NORM_EPS, NUM_HEADS};
use tensor::Tensor;

/// Sums the word, position, and token-type embeddings for `ids` and applies
/// the embedding-stage layer norm. `ids` already includes padding.
fn embedder_forward(ids: &[u32], embeddings: &Embeddings) -> Result<Tensor> {
    let word = nn::embedding_lookup(ids, &embeddings.word)?;

    let position_ids: Vec<u32> = (0..ids.len() as u32).collect();
    let position = nn::embedding_lookup(&position_ids, &embeddings.position)?;
    word.binary_op(&position, tensor::BinOp::Add)?;

    let token_type_ids = vec![0u32; ids.len()];
    let token_type = nn::embedding_lookup(&token_type_ids, &embeddings.token_type)?;
    word.binary_op(&token_type, tensor::BinOp::Add)?;

    word.layer_norm(&embeddings.ln_gamma, &embeddings.ln_beta, LAYER_NORM_EPS)?;
    Ok(word)
}

/// One encoder block: masked self-attention with its residual+LN, followed
/// by the GELU feed-forward with its own residual+LN.
fn encoder_layer_forward(x: &Tensor, layer: &EncoderLayer, ids: &[u32]) -> Result<Tensor> {
    let q = nn::linear(x, &layer.query, &layer.query_bias)?;
    let k = nn::linear(x, &layer.key, &layer.key_bias)?;
    let v = nn::linear(x, &layer.value, &layer.value_bias)?;
    let attn = nn::attention(&q, &k, &v, ids, NUM_HEADS)?;

    let attn_out = nn::linear(&attn, &layer.attention_output.weight, &layer.attention_output.bias)?;
    attn_out.binary_op(x, tensor::BinOp::Add)?;
    attn_out.layer_norm(
        &layer.attention_output.ln_gamma,
        &layer.attention_output.ln_beta,
        LAYER_NORM_EPS,
    )?;

    let intermediate = nn::linear(&attn_out, &layer.intermediate_weight, &layer.intermediate_bias)?;
    intermediate.unary_op(tensor::UnOp::Gelu)?;

    let out = nn::linear(&intermediate, &layer.output.weight, &layer.output.bias)?;
    out.binary_op(&attn_out, tensor::BinOp::Add)?;
    out.layer_norm(&layer.output.ln_gamma, &layer.output.ln_beta, LAYER_NORM_EPS)?;
    Ok(out)
}

/// A bound set of weights plus the forward pass that turns a padded token id
/// sequence into a single L2-normalized sentence embedding.
pub struct Encoder {
    weights: ModelWeights,
}

impl Encoder {
    pub fn new(weights: ModelWeights) -> Encoder {
        Encoder { weights }
    }

    pub fn weights(&self) -> &ModelWeights {
        &self.weights
    }

    /// Runs the full forward pass: embeddings, six encoder layers, masked
    /// mean pooling, L2 normalization. `ids` must already be padded to
    /// [`minilm_base::MAX_TOKENS`] with `0` marking padding positions.
    pub fn encode(&self, ids: &[u32]) -> Result<Tensor> {
        let mut hidden = embedder_forward(ids, &self.weights.embeddings)?;
        for layer in &self.weights.layers {
            hidden = encoder_layer_forward(&hidden, layer, ids)?;
        }
        let pooled = nn::mean_pool(&hidden, ids)?;
        pooled.l2_normalize()?;
        Ok(pooled)
    }
}
