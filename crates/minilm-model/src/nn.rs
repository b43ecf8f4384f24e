//! Neural primitives the encoder is built from: embedding lookup, a linear
//! layer (transpose-then-matmul, since weights are stored `[out, in]`),
//! masked multi-head scaled dot-product attention, and masked mean pooling.
//! Grounded on `nn.c`'s `nn_embeddings_forward`, `nn_linear_forward`,
//! `nn_dot_product_attention_forward`, and `nn_mean_pooling`.

use minilm_base::HEAD_SIZE;
use tensor::{BinOp, Result, Tensor, UnOp};

/// Row-gathers `table[ids[i]]` into `out[i]`, i.e. `out[S, H] <- table[ids]`.
pub fn embedding_lookup(ids: &[u32], table: &Tensor) -> Result<Tensor> {
    let hidden = table.dims()[1];
    let out = Tensor::create(&[ids.len(), hidden])?;
    for (i, &id) in ids.iter().enumerate() {
        let dst = out.slice(0, i, true)?;
        let src = table.slice(0, id as usize, true)?;
        dst.copy_from(&src)?;
    }
    Ok(out)
}

/// `x[S,K] @ W[M,K]^T + b[M] -> out[S,M]`. Weights are stored row-major as
/// `[out_features, in_features]` (the PyTorch `nn.Linear` convention), so
/// the transpose happens here rather than at load time.
pub fn linear(x: &Tensor, weight: &Tensor, bias: &Tensor) -> Result<Tensor> {
    let weight_t = weight.permute(0, 1)?;
    let out = Tensor::matmul(x, &weight_t)?;
    out.binary_op(bias, BinOp::Add)?;
    Ok(out)
}

/// Masked multi-head scaled dot-product attention over a single sequence.
/// `q`, `k`, `v` are each `[S, H]`; `ids` is the (padded) token id sequence
/// used to mask out padding positions from both the query and key axes.
/// Returns `[S, H]`, materialized as an owned contiguous tensor.
pub fn attention(q: &Tensor, k: &Tensor, v: &Tensor, ids: &[u32], num_heads: usize) -> Result<Tensor> {
    let seq_len = q.dims()[0];
    let hidden = q.dims()[1];
    let head_size = hidden / num_heads;
    debug_assert_eq!(head_size, HEAD_SIZE);

    let q_heads = q.reshape_view(&[seq_len, num_heads, head_size])?.permute(0, 1)?; // [N,S,D]
    let k_heads = k.reshape_view(&[seq_len, num_heads, head_size])?.permute(0, 1)?; // [N,S,D]
    let k_heads_t = k_heads.permute(1, 2)?; // [N,D,S]
    let v_heads = v.reshape_view(&[seq_len, num_heads, head_size])?.permute(0, 1)?; // [N,S,D]

    let scores = Tensor::bmm(&q_heads, &k_heads_t)?; // [N,S,S]
    scores.unary_op(UnOp::Scale(1.0 / (head_size as f32).sqrt()))?;

    const MASK_VALUE: f32 = -1e9;
    for head in 0..num_heads {
        for qi in 0..seq_len {
            let query_is_padding = ids[qi] == 0;
            for ki in 0..seq_len {
                if query_is_padding || ids[ki] == 0 {
                    scores.set(&[head, qi, ki], MASK_VALUE);
                }
            }
        }
    }

    for head in 0..num_heads {
        let head_scores = scores.slice(0, head, false)?; // [S,S]
        for qi in 0..seq_len {
            head_scores.slice(0, qi, false)?.softmax_last_axis()?; // [S] over keys
        }
    }

    let weighted = Tensor::bmm(&scores, &v_heads)?; // [N,S,D]
    let merged = weighted.permute(0, 1)?.reshape_view(&[seq_len, hidden])?; // [S,H] view
    Ok(merged.copy())
}

/// Averages the rows of `x[S,H]` at non-padding positions (`ids[i] != 0`)
/// into a single `[H]` vector. All-padding input yields a zero vector.
pub fn mean_pool(x: &Tensor, ids: &[u32]) -> Result<Tensor> {
    let hidden = x.dims()[1];
    let non_padding: Vec<usize> = ids
        .iter()
        .enumerate()
        .filter(|&(_, &id)| id != 0)
        .map(|(i, _)| i)
        .collect();

    if non_padding.is_empty() {
        return Tensor::create(&[hidden]);
    }

    let acc = x.slice(0, non_padding[0], false)?.copy();
    for &i in &non_padding[1..] {
        let row = x.slice(0, i, false)?;
        acc.binary_op(&row, BinOp::Add)?;
    }
    acc.unary_op(UnOp::Scale(1.0 / non_padding.len() as f32))?;
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn embedding_lookup_gathers_rows() {
        let table = Tensor::from_vec(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let out = embedding_lookup(&[2, 0], &table).unwrap();
        assert_eq!(out.dims(), &[2, 2]);
        assert_eq!(out.get(&[0, 0]), 5.0);
        assert_eq!(out.get(&[0, 1]), 6.0);
        assert_eq!(out.get(&[1, 0]), 1.0);
    }

    #[test]
    fn linear_transposes_stored_out_in_weight() {
        // x: [1,2], weight stored [out=3,in=2], bias [3]
        let x = Tensor::from_vec(&[1, 2], vec![1.0, 1.0]).unwrap();
        let w = Tensor::from_vec(&[3, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        let b = Tensor::from_vec(&[3], vec![0.0, 0.0, 10.0]).unwrap();
        let out = linear(&x, &w, &b).unwrap();
        assert_eq!(out.dims(), &[1, 3]);
        assert_eq!(out.get(&[0, 0]), 1.0);
        assert_eq!(out.get(&[0, 1]), 1.0);
        assert_eq!(out.get(&[0, 2]), 12.0);
    }

    #[test]
    fn mean_pool_ignores_padding_rows() {
        let x = Tensor::from_vec(&[3, 2], vec![2.0, 2.0, 100.0, 100.0, 4.0, 4.0]).unwrap();
        let pooled = mean_pool(&x, &[5, 0, 7]).unwrap();
        assert_relative_eq!(pooled.get(&[0]), 3.0, epsilon = 1e-6);
        assert_relative_eq!(pooled.get(&[1]), 3.0, epsilon = 1e-6);
    }

    #[test]
    fn mean_pool_of_all_padding_is_zero() {
        let x = Tensor::from_vec(&[2, 2], vec![9.0, 9.0, 9.0, 9.0]).unwrap();
        let pooled = mean_pool(&x, &[0, 0]).unwrap();
        assert_eq!(pooled.dims(), &[2]);
        assert_eq!(pooled.get(&[0]), 0.0);
        assert_eq!(pooled.get(&[1]), 0.0);
    }

    #[test]
    fn attention_masks_out_padding_keys() {
        // Two real tokens + one padding token; the padding row should not
        // influence either real row's attention output.
        let seq_len = 3;
        let num_heads = 1;
        let head_size = 2;
        let hidden = num_heads * head_size;
        // Distinct Q/K/V per row so attending to the pad row would be visible.
        let q = Tensor::from_vec(&[seq_len, hidden], vec![1.0, 0.0, 0.0, 1.0, 5.0, 5.0]).unwrap();
        let k = q.copy();
        let v = Tensor::from_vec(&[seq_len, hidden], vec![1.0, 1.0, 2.0, 2.0, 999.0, 999.0]).unwrap();
        let ids = [11u32, 22, 0]; // row 2 is padding

        let out = attention(&q, &k, &v, &ids, num_heads).unwrap();
        assert_eq!(out.dims(), &[seq_len, hidden]);
        for row in 0..2 {
            for col in 0..hidden {
                assert!(out.get(&[row, col]) < 900.0, "padding row leaked into output");
            }
        }
    }
}
