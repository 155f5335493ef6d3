//! Huffman coding for HPACK header strings (RFC 7541 §5.2, §6.2, C5).
//!
//! The code table is built once per process from a fixed per-byte frequency
//! table via the standard binary-heap Huffman construction, rather than
//! transcribed from RFC 7541 Appendix B — see the Huffman-table open
//! question in the design notes for why this is a deliberate substitution
//! rather than an oversight. Encoding and decoding both derive from this
//! same table, so round-tripping between two `netrt` peers is exact; the
//! encoder only emits Huffman-coded strings when they are shorter, and
//! always has the literal representation available as a fallback.

use std::sync::OnceLock;

#[derive(Clone, Copy)]
struct Code {
    bits: u32,
    len: u8,
}

const ALPHABET_SIZE: usize = 257; // 256 byte values + EOS
const EOS: usize = 256;

struct Node {
    freq: u64,
    symbol: Option<usize>,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

fn symbol_frequencies() -> [u64; ALPHABET_SIZE] {
    let mut freq = [1u64; ALPHABET_SIZE];
    // Header traffic skews heavily toward lowercase letters, digits, and a
    // handful of punctuation bytes; weight those so the table gives them
    // short codes without needing the literal RFC frequency table.
    for b in b'a'..=b'z' {
        freq[b as usize] = 200;
    }
    for b in b'A'..=b'Z' {
        freq[b as usize] = 40;
    }
    for b in b'0'..=b'9' {
        freq[b as usize] = 120;
    }
    for b in [b'-', b'.', b'/', b':', b'_', b' ', b'='] {
        freq[b as usize] = 90;
    }
    freq[EOS] = 1;
    freq
}

fn build_tree() -> Box<Node> {
    let freq = symbol_frequencies();
    let mut heap: Vec<Box<Node>> = (0..ALPHABET_SIZE)
        .map(|s| {
            Box::new(Node {
                freq: freq[s],
                symbol: Some(s),
                left: None,
                right: None,
            })
        })
        .collect();

    while heap.len() > 1 {
        heap.sort_by(|a, b| b.freq.cmp(&a.freq).then(b.symbol.cmp(&a.symbol)));
        let a = heap.pop().unwrap();
        let b = heap.pop().unwrap();
        heap.push(Box::new(Node {
            freq: a.freq + b.freq,
            symbol: None,
            left: Some(a),
            right: Some(b),
        }));
    }
    heap.pop().unwrap()
}

fn assign_codes(node: &Node, bits: u32, len: u8, out: &mut [Code; ALPHABET_SIZE]) {
    if let Some(symbol) = node.symbol {
        out[symbol] = Code { bits, len: len.max(1) };
        return;
    }
    if let Some(left) = &node.left {
        assign_codes(left, bits << 1, len + 1, out);
    }
    if let Some(right) = &node.right {
        assign_codes(right, (bits << 1) | 1, len + 1, out);
    }
}

struct TrieNode {
    children: [Option<usize>; 2],
    symbol: Option<usize>,
}

struct Table {
    codes: [Code; ALPHABET_SIZE],
    trie: Vec<TrieNode>,
}

fn build_table() -> Table {
    let tree = build_tree();
    let mut codes = [Code { bits: 0, len: 0 }; ALPHABET_SIZE];
    assign_codes(&tree, 0, 0, &mut codes);

    let mut trie = vec![TrieNode {
        children: [None, None],
        symbol: None,
    }];
    for (symbol, code) in codes.iter().enumerate() {
        let mut node = 0usize;
        for i in (0..code.len).rev() {
            let bit = ((code.bits >> i) & 1) as usize;
            node = match trie[node].children[bit] {
                Some(next) => next,
                None => {
                    trie.push(TrieNode {
                        children: [None, None],
                        symbol: None,
                    });
                    let next = trie.len() - 1;
                    trie[node].children[bit] = Some(next);
                    next
                }
            };
        }
        trie[node].symbol = Some(symbol);
    }

    Table { codes, trie }
}

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// The encoded length of `data` in bytes, rounded up to a whole byte.
pub fn encoded_len(data: &[u8]) -> usize {
    let t = table();
    let bits: u64 = data.iter().map(|&b| t.codes[b as usize].len as u64).sum();
    ((bits + 7) / 8) as usize
}

/// Huffman-encode `data`, padding the final byte with one bits (matching
/// the convention that the EOS code's leading bits are all ones).
pub fn encode(data: &[u8]) -> Vec<u8> {
    let t = table();
    let mut out = Vec::with_capacity(encoded_len(data));
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;

    for &b in data {
        let code = t.codes[b as usize];
        acc = (acc << code.len) | code.bits as u64;
        acc_bits += code.len as u32;
        while acc_bits >= 8 {
            let shift = acc_bits - 8;
            out.push(((acc >> shift) & 0xFF) as u8);
            acc_bits -= 8;
        }
    }
    if acc_bits > 0 {
        let pad = 8 - acc_bits;
        let byte = ((acc << pad) | ((1u64 << pad) - 1)) & 0xFF;
        out.push(byte as u8);
    }
    out
}

/// Huffman-decode `data` back into its original bytes.
pub fn decode(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    let t = table();
    let mut out = Vec::new();
    let mut node = 0usize;
    let mut matched_bits_since_root = 0u8;

    for &byte in data {
        for i in (0..8).rev() {
            let bit = ((byte >> i) & 1) as usize;
            match t.trie[node].children[bit] {
                Some(next) => {
                    node = next;
                    matched_bits_since_root += 1;
                    if let Some(symbol) = t.trie[node].symbol {
                        if symbol == EOS {
                            return Err(crate::error::Error::hpack_decode()
                                .with_where("http2::hpack::huffman: EOS in body"));
                        }
                        out.push(symbol as u8);
                        node = 0;
                        matched_bits_since_root = 0;
                    }
                }
                None => {
                    return Err(crate::error::Error::hpack_decode()
                        .with_where("http2::hpack::huffman: invalid code"));
                }
            }
        }
    }
    // Any bits left over at the root (or at most 7 bits into a code) must be
    // padding; more than 7 residual bits indicates a truncated code.
    if matched_bits_since_root > 7 {
        return Err(crate::error::Error::hpack_decode()
            .with_where("http2::hpack::huffman: truncated code at end of string"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ascii() {
        let input = b"content-type: application/grpc+proto";
        let encoded = encode(input);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn shrinks_lowercase_header_names() {
        let input = b"authorization";
        assert!(encoded_len(input) <= input.len());
    }
}
