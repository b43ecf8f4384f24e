//! A WordPiece tokenizer: whitespace splitting, then a greedy longest match
//! against the vocabulary trie, with at most one `##`-continuation lookup
//! per word. There is no `[UNK]` fallback — an unmatched prefix is an error
//! (see [`TokenizerError::UnknownSubword`]).

pub mod error;
mod trie;

use std::fs;
use std::path::Path;

pub use error::{Result, TokenizerError};
pub use trie::{Trie, TrieNode};

pub const CLS_ID: u32 = 101;
pub const SEP_ID: u32 = 102;

pub struct WordpieceTokenizer {
    trie: Trie,
}

impl WordpieceTokenizer {
    /// Reads one token per line. The line index is the token's vocabulary
    /// ID; lines starting with `[` (`[PAD]`, `[UNK]`, `[CLS]`, `[SEP]`, ...)
    /// are not inserted into the trie, but the line counter still advances
    /// so the IDs of ordinary tokens land where the vocabulary file expects.
    pub fn from_vocab_file<P: AsRef<Path>>(path: P) -> Result<WordpieceTokenizer> {
        let path_str = path.as_ref().display().to_string();
        let contents = fs::read_to_string(&path)
            .map_err(|source| TokenizerError::Io { path: path_str.clone(), source })?;

        let mut trie = Trie::new();
        for (i, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim_end_matches([' ', '\t', '\r', '\n']);
            if line.is_empty() || line.as_bytes()[0] == b'[' {
                continue;
            }
            trie.insert(line.as_bytes(), i as u32);
        }
        Ok(WordpieceTokenizer { trie })
    }

    fn continuation_root(&self) -> Option<&TrieNode> {
        self.trie.root().find_child(b'#')?.find_child(b'#')
    }

    /// Encodes `text` as `[CLS] token... [SEP]`, with no padding and no
    /// sequence-length limit applied here (that belongs to whatever
    /// constructs a fixed-length input sequence from these IDs).
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let continuation_root =
            self.continuation_root().ok_or(TokenizerError::MissingContinuationSubtree)?;

        let mut ids = vec![CLS_ID];
        for part in text.split(' ').filter(|s| !s.is_empty()) {
            let bytes = part.as_bytes();
            let (node, matched) = self.trie.longest(bytes);
            if matched == 0 {
                return Err(TokenizerError::UnknownSubword(part.to_string()));
            }
            ids.push(node.value());

            let remaining = &bytes[matched..];
            if remaining.is_empty() {
                continue;
            }
            let (cont_node, cont_matched) = Trie::longest_from(continuation_root, remaining);
            if cont_matched != remaining.len() {
                return Err(TokenizerError::UnknownSubword(part.to_string()));
            }
            ids.push(cont_node.value());
        }
        ids.push(SEP_ID);
        Ok(ids)
    }
}
