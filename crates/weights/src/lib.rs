//! Reader for the `TBF1` weight container format: a magic, a tensor count,
//! then one header per tensor (name, dtype, shape, and a byte offset into
//! the same file) followed by the tensor payloads themselves, which may
//! appear in any order relative to their headers. Every f32 tensor is read
//! fully into memory at open time; non-f32 tensors are kept as raw bytes
//! since this workspace's compute path never casts them (see the dtype
//! column of §6.1).

pub mod error;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub use error::{Result, WeightsError};
use tensor::Tensor;

pub const MAGIC: &[u8; 4] = b"TBF1";

/// Tensor element type as recorded in a TBF1 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    F64,
    I64,
    I32,
    U8,
}

impl DType {
    fn from_tag(tag: u8) -> Option<DType> {
        match tag {
            1 => Some(DType::F32),
            2 => Some(DType::F16),
            3 => Some(DType::F64),
            4 => Some(DType::I64),
            5 => Some(DType::I32),
            6 => Some(DType::U8),
            _ => None,
        }
    }

    fn tag(self) -> u8 {
        match self {
            DType::F32 => 1,
            DType::F16 => 2,
            DType::F64 => 3,
            DType::I64 => 4,
            DType::I32 => 5,
            DType::U8 => 6,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::F64 => "f64",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        };
        f.write_str(s)
    }
}

struct Entry {
    dtype: DType,
    dims: Vec<usize>,
    offset: u64,
    nbytes: u64,
    tensor: Option<Tensor>,
    raw: Option<Vec<u8>>,
}

/// An open TBF1 file: every f32 tensor is resident; non-f32 tensors are
/// kept as raw bytes. Dropping the container frees everything it loaded —
/// there is no separate `close`, since `Drop` already gives that guarantee.
pub struct WeightContainer {
    path: String,
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

fn read_u8<R: Read>(r: &mut R, path: &str) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|source| WeightsError::Read { path: path.to_string(), source })?;
    Ok(buf[0])
}

fn read_u16<R: Read>(r: &mut R, path: &str) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)
        .map_err(|source| WeightsError::Read { path: path.to_string(), source })?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R, path: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|source| WeightsError::Read { path: path.to_string(), source })?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R, path: &str) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|source| WeightsError::Read { path: path.to_string(), source })?;
    Ok(u64::from_le_bytes(buf))
}

impl WeightContainer {
    /// Opens and fully parses a TBF1 file. Every header is read in file
    /// order; after each header the reader seeks to that tensor's payload,
    /// reads it, and seeks back to keep reading headers, mirroring the
    /// original format's streaming-reader design.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WeightContainer> {
        let path_str = path.as_ref().display().to_string();
        let file = File::open(&path)
            .map_err(|source| WeightsError::Open { path: path_str.clone(), source })?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|source| WeightsError::Read { path: path_str.clone(), source })?;
        if &magic != MAGIC {
            return Err(WeightsError::BadMagic { path: path_str, got: magic });
        }

        let count = read_u64(&mut reader, &path_str)?;
        let mut order = Vec::with_capacity(count as usize);
        let mut entries = HashMap::with_capacity(count as usize);

        for index in 0..count {
            let name_len = read_u16(&mut reader, &path_str)? as usize;
            let mut name_buf = vec![0u8; name_len];
            reader
                .read_exact(&mut name_buf)
                .map_err(|source| WeightsError::Read { path: path_str.clone(), source })?;
            let name = String::from_utf8(name_buf)
                .map_err(|_| WeightsError::InvalidName { path: path_str.clone(), index })?;

            let dtype_tag = read_u8(&mut reader, &path_str)?;
            let dtype = DType::from_tag(dtype_tag).ok_or_else(|| WeightsError::MalformedHeader {
                path: path_str.clone(),
                index,
                detail: format!("unknown dtype tag {dtype_tag}"),
            })?;

            let ndim = read_u8(&mut reader, &path_str)? as usize;
            if ndim == 0 || ndim > tensor::MAX_DIM {
                return Err(WeightsError::MalformedHeader {
                    path: path_str.clone(),
                    index,
                    detail: format!("ndim {ndim} out of range 1..={}", tensor::MAX_DIM),
                });
            }
            let mut dims = Vec::with_capacity(ndim);
            for _ in 0..ndim {
                dims.push(read_u32(&mut reader, &path_str)? as usize);
            }

            let offset = read_u64(&mut reader, &path_str)?;
            let nbytes = read_u64(&mut reader, &path_str)?;

            let resume_at = reader
                .stream_position()
                .map_err(|source| WeightsError::Read { path: path_str.clone(), source })?;
            reader
                .seek(SeekFrom::Start(offset))
                .map_err(|source| WeightsError::Read { path: path_str.clone(), source })?;

            let mut payload = vec![0u8; nbytes as usize];
            reader
                .read_exact(&mut payload)
                .map_err(|source| WeightsError::Read { path: path_str.clone(), source })?;

            reader
                .seek(SeekFrom::Start(resume_at))
                .map_err(|source| WeightsError::Read { path: path_str.clone(), source })?;

            let (compute_tensor, raw) = if dtype == DType::F32 {
                let expected_elems: usize = dims.iter().product();
                if payload.len() != expected_elems * 4 {
                    return Err(WeightsError::MalformedHeader {
                        path: path_str.clone(),
                        index,
                        detail: format!(
                            "f32 payload is {} bytes, expected {}",
                            payload.len(),
                            expected_elems * 4
                        ),
                    });
                }
                let mut data = Vec::with_capacity(expected_elems);
                for chunk in payload.chunks_exact(4) {
                    data.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
                }
                (Some(Tensor::from_vec(&dims, data)?), None)
            } else {
                (None, Some(payload))
            };

            log::debug!(
                "tbf: loaded tensor \"{name}\" dtype={dtype} dims={dims:?} offset={offset} nbytes={nbytes}"
            );

            order.push(name.clone());
            entries.insert(
                name,
                Entry { dtype, dims, offset, nbytes, tensor: compute_tensor, raw },
            );
        }

        log::info!("tbf: opened {path_str} with {count} tensors");
        Ok(WeightContainer { path: path_str, order, entries })
    }

    /// Returns a cheap, storage-sharing handle to the named f32 tensor.
    /// Errors if the name is absent or the tensor's on-disk dtype is not
    /// f32 (this core never casts compute tensors).
    pub fn get(&self, name: &str) -> Result<Tensor> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| WeightsError::MissingTensor(name.to_string()))?;
        entry.tensor.clone().ok_or_else(|| WeightsError::WrongDtype {
            name: name.to_string(),
            dtype: entry.dtype.tag(),
        })
    }

    /// Raw bytes for a non-f32 tensor, e.g. for introspection tooling.
    pub fn get_raw(&self, name: &str) -> Result<&[u8]> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| WeightsError::MissingTensor(name.to_string()))?;
        entry
            .raw
            .as_deref()
            .ok_or_else(|| WeightsError::MissingTensor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// A human-readable dump of the tensor table, one line per entry.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{} contains {} tensors:\n", self.path, self.len()));
        for name in &self.order {
            let e = &self.entries[name];
            out.push_str(&format!(
                "{name:<50} dtype={:<4} ndim={} nbytes={:<8} offset={:<8} shape={:?}\n",
                e.dtype, e.dims.len(), e.nbytes, e.offset, e.dims
            ));
        }
        out
    }
}
