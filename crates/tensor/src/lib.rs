//! A compact, eager, row-major float32 tensor library.
//!
//! Tensors are either owning or non-owning views over a shared,
//! reference-counted buffer (`Rc<RefCell<Vec<f32>>>`). A view is produced by
//! `slice` or `reshape_view` and aliases its parent's storage; an owning
//! tensor is produced by `create`, `from_vec`, `matmul`, `bmm`, `copy` and
//! `permute`. Nothing here is `Send`/`Sync` — a `Tensor` is meant to live and
//! die inside one forward pass on one thread.

pub mod error;

use std::cell::RefCell;
use std::rc::Rc;

pub use error::{Result, TensorError};

/// Tensors in this crate never exceed this many axes; the model this crate
/// was built for needs at most 3 (batch, seq, hidden).
pub const MAX_DIM: usize = 4;

fn validate_rank(rank: usize) -> Result<()> {
    if rank == 0 || rank > MAX_DIM {
        return Err(TensorError::InvalidRank { got: rank });
    }
    Ok(())
}

fn contiguous_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

/// Elementwise binary operation applied by [`Tensor::binary_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Elementwise unary operation applied in place by [`Tensor::unary_op`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnOp {
    Neg,
    Exp,
    Log,
    /// tanh approximation of GELU, as used throughout the encoder's FFN.
    Gelu,
    Abs,
    Scale(f32),
    SubScalar(f32),
    Pow(f32),
}

/// A row-major float32 tensor, owning or viewing shared storage.
#[derive(Debug)]
pub struct Tensor {
    storage: Rc<RefCell<Vec<f32>>>,
    offset: usize,
    dims: Vec<usize>,
    strides: Vec<usize>,
    owned: bool,
}

impl Clone for Tensor {
    /// Clones are cheap: they share storage with the original. Use [`Tensor::copy`]
    /// for an independent deep copy.
    fn clone(&self) -> Self {
        Tensor {
            storage: Rc::clone(&self.storage),
            offset: self.offset,
            dims: self.dims.clone(),
            strides: self.strides.clone(),
            owned: self.owned,
        }
    }
}

impl Tensor {
    /// Allocates a new owning, zero-filled, contiguous tensor.
    pub fn create(dims: &[usize]) -> Result<Tensor> {
        validate_rank(dims.len())?;
        let numel: usize = dims.iter().product();
        Tensor::from_vec(dims, vec![0.0; numel])
    }

    /// Wraps an existing flat buffer as an owning, contiguous tensor.
    pub fn from_vec(dims: &[usize], data: Vec<f32>) -> Result<Tensor> {
        validate_rank(dims.len())?;
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(TensorError::DataLengthMismatch {
                dims: dims.to_vec(),
                expected,
                got: data.len(),
            });
        }
        Ok(Tensor {
            strides: contiguous_strides(dims),
            storage: Rc::new(RefCell::new(data)),
            offset: 0,
            dims: dims.to_vec(),
            owned: true,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.dims)
    }

    /// Maps a row-major linear index (0..numel) over `self.dims` to a byte-less
    /// offset into the shared storage, honoring this tensor's strides.
    fn linear_to_offset(&self, mut linear: usize) -> usize {
        let ndim = self.dims.len();
        let mut off = self.offset;
        for i in (0..ndim).rev() {
            let d = self.dims[i];
            let coord = linear % d;
            linear /= d;
            off += coord * self.strides[i];
        }
        off
    }

    /// Returns a non-owning view over one index along `axis`. When `keepdim`
    /// is false the axis is dropped from the result's shape, otherwise it is
    /// kept with extent 1.
    pub fn slice(&self, axis: usize, index: usize, keepdim: bool) -> Result<Tensor> {
        let ndim = self.dims.len();
        if axis >= ndim {
            return Err(TensorError::AxisOutOfRange { axis, rank: ndim });
        }
        if index >= self.dims[axis] {
            return Err(TensorError::IndexOutOfRange {
                axis,
                index,
                dim: self.dims[axis],
            });
        }
        let new_offset = self.offset + index * self.strides[axis];
        let (dims, strides) = if keepdim {
            let mut dims = self.dims.clone();
            dims[axis] = 1;
            (dims, self.strides.clone())
        } else {
            let mut dims = Vec::with_capacity(ndim.saturating_sub(1));
            let mut strides = Vec::with_capacity(ndim.saturating_sub(1));
            for i in 0..ndim {
                if i == axis {
                    continue;
                }
                dims.push(self.dims[i]);
                strides.push(self.strides[i]);
            }
            if dims.is_empty() {
                dims.push(1);
                strides.push(1);
            }
            (dims, strides)
        };
        Ok(Tensor {
            storage: Rc::clone(&self.storage),
            offset: new_offset,
            dims,
            strides,
            owned: false,
        })
    }

    /// Reinterprets a contiguous tensor's buffer under a new shape with the
    /// same element count. Used to split a linear projection's output into
    /// per-head form, e.g. `[S, H]` -> `[S, N, D]`.
    pub fn reshape_view(&self, dims: &[usize]) -> Result<Tensor> {
        validate_rank(dims.len())?;
        if !self.is_contiguous() {
            return Err(TensorError::NotContiguous);
        }
        let expected: usize = dims.iter().product();
        if expected != self.numel() {
            return Err(TensorError::DataLengthMismatch {
                dims: dims.to_vec(),
                expected: self.numel(),
                got: expected,
            });
        }
        Ok(Tensor {
            storage: Rc::clone(&self.storage),
            offset: self.offset,
            strides: contiguous_strides(dims),
            dims: dims.to_vec(),
            owned: false,
        })
    }

    /// Materializes an independent, contiguous, owning deep copy.
    pub fn copy(&self) -> Tensor {
        let total = self.numel();
        let mut data = Vec::with_capacity(total);
        {
            let src = self.storage.borrow();
            for linear in 0..total {
                data.push(src[self.linear_to_offset(linear)]);
            }
        }
        Tensor::from_vec(&self.dims, data).expect("copy: length matches dims by construction")
    }

    /// Copies `other`'s elements into `self`, which must have the same shape.
    /// Used to assemble a larger tensor out of independently computed
    /// pieces, e.g. one batch slice of a [`Tensor::bmm`] result or one
    /// gathered row of [`Tensor::embedding_lookup`].
    pub fn copy_from(&self, other: &Tensor) -> Result<()> {
        if self.dims != other.dims {
            return Err(TensorError::IncompatibleBroadcast {
                out: self.dims.clone(),
                other: other.dims.clone(),
            });
        }
        let total = self.numel();
        let src = other.storage.borrow();
        let mut dst = self.storage.borrow_mut();
        for linear in 0..total {
            dst[self.linear_to_offset(linear)] = src[other.linear_to_offset(linear)];
        }
        Ok(())
    }

    fn offset_of(&self, idx: &[usize]) -> usize {
        debug_assert_eq!(idx.len(), self.dims.len());
        let mut off = self.offset;
        for (i, &c) in idx.iter().enumerate() {
            off += c * self.strides[i];
        }
        off
    }

    /// Reads a single element by full coordinate.
    pub fn get(&self, idx: &[usize]) -> f32 {
        self.storage.borrow()[self.offset_of(idx)]
    }

    /// Writes a single element by full coordinate.
    pub fn set(&self, idx: &[usize], v: f32) {
        self.storage.borrow_mut()[self.offset_of(idx)] = v;
    }

    fn sum_of_squares(&self) -> f32 {
        let total = self.numel();
        let data = self.storage.borrow();
        (0..total)
            .map(|linear| {
                let v = data[self.linear_to_offset(linear)];
                v * v
            })
            .sum()
    }

    /// Swaps axes `d0` and `d1`, materializing a new contiguous owning
    /// tensor. A carry-odometer walk over the output's coordinates, with a
    /// batched-memcpy fast path when both the input and output keep the
    /// innermost axis at unit stride (the common case: transposing a batch
    /// or head axis past a row that stays intact).
    pub fn permute(&self, d0: usize, d1: usize) -> Result<Tensor> {
        let ndim = self.dims.len();
        if d0 >= ndim {
            return Err(TensorError::AxisOutOfRange { axis: d0, rank: ndim });
        }
        if d1 >= ndim {
            return Err(TensorError::AxisOutOfRange { axis: d1, rank: ndim });
        }
        if d0 == d1 {
            return Ok(self.copy());
        }

        let mut perm: Vec<usize> = (0..ndim).collect();
        perm.swap(d0, d1);
        let mut out_dims = self.dims.clone();
        out_dims.swap(d0, d1);

        let out = Tensor::create(&out_dims)?;
        let in_step_for_out: Vec<usize> = perm.iter().map(|&p| self.strides[p]).collect();
        let out_strides = out.strides.clone();

        let inner = ndim - 1;
        let run = out_dims[inner];
        let unit_stride = out_strides[inner] == 1 && in_step_for_out[inner] == 1;

        let in_data = self.storage.borrow();
        let mut out_data = out.storage.borrow_mut();

        if unit_stride {
            let outer_runs: usize = out_dims[..inner].iter().product::<usize>().max(1);
            for run_idx in 0..outer_runs {
                let mut rem = run_idx;
                let mut in_off = self.offset;
                let mut out_off = out.offset;
                for i in (0..inner).rev() {
                    let d = out_dims[i];
                    let coord = rem % d;
                    rem /= d;
                    in_off += coord * in_step_for_out[i];
                    out_off += coord * out_strides[i];
                }
                out_data[out_off..out_off + run].copy_from_slice(&in_data[in_off..in_off + run]);
            }
        } else {
            let total = out_dims.iter().product::<usize>();
            for linear in 0..total {
                let mut rem = linear;
                let mut in_off = self.offset;
                let mut out_off = out.offset;
                for i in (0..ndim).rev() {
                    let d = out_dims[i];
                    let coord = rem % d;
                    rem /= d;
                    in_off += coord * in_step_for_out[i];
                    out_off += coord * out_strides[i];
                }
                out_data[out_off] = in_data[in_off];
            }
        }
        drop(in_data);
        drop(out_data);
        Ok(out)
    }

    /// Rank-2 matrix multiply, `[M, K] x [K, N] -> [M, N]`. Both operands
    /// must be contiguous; blocked ijk tiling (128x128x64) with a 4-wide
    /// inner unroll keeps the working set in cache for the hidden sizes this
    /// crate deals with.
    pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
        if a.dims.len() != 2 || b.dims.len() != 2 {
            return Err(TensorError::MatmulRank {
                a_rank: a.dims.len(),
                b_rank: b.dims.len(),
            });
        }
        if !a.is_contiguous() || !b.is_contiguous() {
            return Err(TensorError::MatmulNonContiguous);
        }
        let (m, k) = (a.dims[0], a.dims[1]);
        let (k2, n) = (b.dims[0], b.dims[1]);
        if k != k2 {
            return Err(TensorError::MatmulInnerMismatch { a_k: k, b_k: k2 });
        }

        let out = Tensor::create(&[m, n])?;
        const BM: usize = 128;
        const BN: usize = 128;
        const BK: usize = 64;

        let a_data = a.storage.borrow();
        let b_data = b.storage.borrow();
        let mut c_data = out.storage.borrow_mut();
        let a_off = a.offset;
        let b_off = b.offset;

        let mut i0 = 0;
        while i0 < m {
            let imax = (i0 + BM).min(m);
            let mut j0 = 0;
            while j0 < n {
                let jmax = (j0 + BN).min(n);
                let mut k0 = 0;
                while k0 < k {
                    let kmax = (k0 + BK).min(k);
                    for i in i0..imax {
                        for kk in k0..kmax {
                            let aik = a_data[a_off + i * k + kk];
                            let mut j = j0;
                            while j + 4 <= jmax {
                                let b_base = b_off + kk * n + j;
                                let c_base = i * n + j;
                                c_data[c_base] += aik * b_data[b_base];
                                c_data[c_base + 1] += aik * b_data[b_base + 1];
                                c_data[c_base + 2] += aik * b_data[b_base + 2];
                                c_data[c_base + 3] += aik * b_data[b_base + 3];
                                j += 4;
                            }
                            while j < jmax {
                                c_data[i * n + j] += aik * b_data[b_off + kk * n + j];
                                j += 1;
                            }
                        }
                    }
                    k0 += BK;
                }
                j0 += BN;
            }
            i0 += BM;
        }
        drop(a_data);
        drop(b_data);
        drop(c_data);
        Ok(out)
    }

    /// Batched matmul, `[B, M, K] x [B, K, N] -> [B, M, N]`, one 2D matmul
    /// per batch element.
    pub fn bmm(a: &Tensor, b: &Tensor) -> Result<Tensor> {
        if a.dims.len() != 3 || b.dims.len() != 3 {
            return Err(TensorError::BmmRank {
                a_rank: a.dims.len(),
                b_rank: b.dims.len(),
            });
        }
        if a.dims[0] != b.dims[0] {
            return Err(TensorError::BmmBatchMismatch {
                a_batch: a.dims[0],
                b_batch: b.dims[0],
            });
        }
        let batch = a.dims[0];
        let m = a.dims[1];
        let n = b.dims[2];
        let out = Tensor::create(&[batch, m, n])?;
        for i in 0..batch {
            let a_i = a.slice(0, i, false)?;
            let b_i = b.slice(0, i, false)?;
            let c_i = Tensor::matmul(&a_i, &b_i)?;
            let out_i = out.slice(0, i, false)?;
            out_i.copy_from(&c_i)?;
        }
        Ok(out)
    }

    fn is_same_shape(&self, other: &Tensor) -> bool {
        self.dims == other.dims
    }

    /// True when `other` is broadcastable against `self` as a trailing-axis
    /// bias: every axis of `other` but the last has extent 1, and its last
    /// axis matches `self`'s last axis.
    fn is_lastdim_bias(&self, other: &Tensor) -> bool {
        let Some(&last) = other.dims.last() else {
            return false;
        };
        if other.dims[..other.dims.len() - 1].iter().any(|&d| d != 1) {
            return false;
        }
        self.dims.last() == Some(&last)
    }

    /// Applies `op` elementwise, in place, writing into `self`. `other` must
    /// either match `self`'s shape exactly, or be a trailing-axis bias (see
    /// [`Tensor::is_lastdim_bias`]), e.g. adding a `[H]` bias into a `[S, H]`
    /// tensor.
    pub fn binary_op(&self, other: &Tensor, op: BinOp) -> Result<()> {
        let apply = |a: f32, b: f32| match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
        };

        if self.is_same_shape(other) {
            let total = self.numel();
            let src = other.storage.borrow();
            let mut dst = self.storage.borrow_mut();
            for linear in 0..total {
                let d_off = self.linear_to_offset(linear);
                let s_off = other.linear_to_offset(linear);
                dst[d_off] = apply(dst[d_off], src[s_off]);
            }
            return Ok(());
        }

        if self.is_lastdim_bias(other) {
            let last_axis = other.dims.len() - 1;
            let n = self.dims[self.dims.len() - 1];
            let total = self.numel();
            let other_stride = other.strides[last_axis];
            let src = other.storage.borrow();
            let mut dst = self.storage.borrow_mut();
            for linear in 0..total {
                let j = linear % n;
                let d_off = self.linear_to_offset(linear);
                let s_off = other.offset + j * other_stride;
                dst[d_off] = apply(dst[d_off], src[s_off]);
            }
            return Ok(());
        }

        Err(TensorError::IncompatibleBroadcast {
            out: self.dims.clone(),
            other: other.dims.clone(),
        })
    }

    /// Applies `op` elementwise, in place.
    pub fn unary_op(&self, op: UnOp) -> Result<()> {
        const GELU_COEFF: f32 = 0.044715;
        const SQRT_2_OVER_PI: f32 = 0.7978845608028654;

        let apply = |x: f32| -> f32 {
            match op {
                UnOp::Neg => -x,
                UnOp::Exp => x.exp(),
                UnOp::Log => x.ln(),
                UnOp::Gelu => {
                    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x)).tanh())
                }
                UnOp::Abs => x.abs(),
                UnOp::Scale(s) => x * s,
                UnOp::SubScalar(s) => x - s,
                UnOp::Pow(p) => x.powf(p),
            }
        };

        let total = self.numel();
        let mut data = self.storage.borrow_mut();
        for linear in 0..total {
            let off = self.linear_to_offset(linear);
            data[off] = apply(data[off]);
        }
        Ok(())
    }

    /// Sums every element.
    pub fn sum(&self) -> f32 {
        let total = self.numel();
        let data = self.storage.borrow();
        (0..total).map(|linear| data[self.linear_to_offset(linear)]).sum()
    }

    /// In-place L2 normalization over the *entire flattened buffer* (not
    /// per-row): divides every element by `sum(x^2)^0.5` taken across all of
    /// `self`'s elements. Only ever called on an already-1-D pooled vector
    /// in this workspace, where that coincides with the familiar L2 norm —
    /// but the flattened reduction, not a per-row one, is the contract here.
    pub fn l2_normalize(&self) -> Result<()> {
        let norm = self.sum_of_squares().sqrt();
        let scale = if norm > 0.0 { 1.0 / norm } else { 0.0 };
        self.unary_op(UnOp::Scale(scale))
    }

    /// In-place layer normalization over the last axis: `(x - mean) / sqrt(var + eps) * gamma + beta`.
    /// `gamma` and `beta` are `[H]` vectors matching `self`'s last axis.
    pub fn layer_norm(&self, gamma: &Tensor, beta: &Tensor, eps: f32) -> Result<()> {
        let ndim = self.dims.len();
        let h = self.dims[ndim - 1];
        if gamma.numel() != h || beta.numel() != h {
            return Err(TensorError::IncompatibleBroadcast {
                out: self.dims.clone(),
                other: gamma.dims.clone(),
            });
        }
        let rows = self.numel() / h;
        let gamma_data = gamma.storage.borrow();
        let beta_data = beta.storage.borrow();
        let mut data = self.storage.borrow_mut();

        for r in 0..rows {
            let base = r * h;
            let mut mean = 0.0f32;
            for j in 0..h {
                mean += data[self.linear_to_offset(base + j)];
            }
            mean /= h as f32;

            let mut var = 0.0f32;
            for j in 0..h {
                let off = self.linear_to_offset(base + j);
                let d = data[off] - mean;
                var += d * d;
            }
            var /= h as f32;
            let inv_std = 1.0 / (var + eps).sqrt();

            for j in 0..h {
                let off = self.linear_to_offset(base + j);
                let g_off = gamma.linear_to_offset(j);
                let b_off = beta.linear_to_offset(j);
                data[off] = (data[off] - mean) * inv_std * gamma_data[g_off] + beta_data[b_off];
            }
        }
        Ok(())
    }

    /// In-place softmax over the last axis of an arbitrary-rank tensor, one
    /// row at a time. Subtracts the row max before exponentiating for
    /// numerical stability. A row whose exponentials sum to zero, or that
    /// contains a NaN/Inf, is replaced with a uniform distribution instead
    /// of propagating garbage.
    pub fn softmax_last_axis(&self) -> Result<()> {
        let ndim = self.dims.len();
        let n = self.dims[ndim - 1];
        let rows = self.numel() / n;
        let mut data = self.storage.borrow_mut();

        for r in 0..rows {
            let base = r * n;
            let offs: Vec<usize> = (0..n).map(|j| self.linear_to_offset(base + j)).collect();

            let has_bad = offs.iter().any(|&off| !data[off].is_finite());
            if has_bad {
                let uniform = 1.0 / n as f32;
                for &off in &offs {
                    data[off] = uniform;
                }
                continue;
            }

            let max = offs.iter().fold(f32::NEG_INFINITY, |acc, &off| acc.max(data[off]));
            let mut sum = 0.0f32;
            for &off in &offs {
                let e = (data[off] - max).exp();
                data[off] = e;
                sum += e;
            }

            if sum == 0.0 || !sum.is_finite() {
                let uniform = 1.0 / n as f32;
                for &off in &offs {
                    data[off] = uniform;
                }
            } else {
                for &off in &offs {
                    data[off] /= sum;
                }
            }
        }
        Ok(())
    }

    /// Serializes rank, dims, element count, strides and the raw data, in
    /// that order, as little-endian values. Only ever read back by
    /// [`Tensor::load`]; not a format shared with anything outside this
    /// crate's own tests.
    pub fn dump<W: std::io::Write>(&self, w: &mut W) -> Result<()> {
        let ndim = self.dims.len() as u8;
        w.write_all(&[ndim])?;
        for &d in &self.dims {
            w.write_all(&(d as u32).to_le_bytes())?;
        }
        let numel = self.numel() as u64;
        w.write_all(&numel.to_le_bytes())?;
        for &s in &self.strides {
            w.write_all(&(s as u64).to_le_bytes())?;
        }
        let total = self.numel();
        let data = self.storage.borrow();
        for linear in 0..total {
            w.write_all(&data[self.linear_to_offset(linear)].to_le_bytes())?;
        }
        Ok(())
    }

    /// Inverse of [`Tensor::dump`]: always returns a fresh, owning, contiguous
    /// tensor (strides recorded in the stream are validated but not reused).
    pub fn load<R: std::io::Read>(r: &mut R) -> Result<Tensor> {
        let mut ndim_buf = [0u8; 1];
        r.read_exact(&mut ndim_buf)?;
        let ndim = ndim_buf[0] as usize;
        validate_rank(ndim)?;

        let mut dims = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            dims.push(u32::from_le_bytes(buf) as usize);
        }

        let mut numel_buf = [0u8; 8];
        r.read_exact(&mut numel_buf)?;
        let numel = u64::from_le_bytes(numel_buf) as usize;
        let expected: usize = dims.iter().product();
        if numel != expected {
            return Err(TensorError::Corrupt(format!(
                "stream declares {numel} elements but dims {dims:?} imply {expected}"
            )));
        }

        let expected_strides = contiguous_strides(&dims);
        for expected_stride in &expected_strides {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf)?;
            let got = u64::from_le_bytes(buf) as usize;
            if got != *expected_stride {
                return Err(TensorError::Corrupt(format!(
                    "stream stride {got} does not match the contiguous layout of dims {dims:?}"
                )));
            }
        }

        let mut data = Vec::with_capacity(numel);
        for _ in 0..numel {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            data.push(f32::from_le_bytes(buf));
        }
        Tensor::from_vec(&dims, data)
    }
}
