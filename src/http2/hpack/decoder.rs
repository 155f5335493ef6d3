//! HPACK header-list decoding (RFC 7541 §6): interprets the representations
//! in a HEADERS/CONTINUATION frame payload, restoring the header list.

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

use super::dynamic_table::DynamicTable;
use super::primitive::{decode_integer, decode_string};
use super::static_table;

pub struct Decoder {
    table: DynamicTable,
}

impl Decoder {
    pub fn new(max_dynamic_table_size: usize) -> Decoder {
        Decoder {
            table: DynamicTable::new(max_dynamic_table_size),
        }
    }

    pub fn set_max_dynamic_table_size(&mut self, size: usize) {
        self.table.set_max_size(size);
    }

    /// Decode a complete header block (already reassembled across any
    /// CONTINUATION frames) into an ordered header list.
    pub fn decode(&mut self, block: &Bytes) -> Result<Vec<(String, String)>> {
        let mut buf = block.clone();
        let mut headers = Vec::new();

        while buf.has_remaining() {
            let first = buf[0];
            if first & 0x80 != 0 {
                buf.advance(1);
                let index = decode_integer(&mut buf, first, 7)?;
                let (name, value) = self.lookup(index)?;
                headers.push((name, value));
            } else if first & 0x40 != 0 {
                buf.advance(1);
                let (name, value) = self.decode_literal(&mut buf, first, 6)?;
                self.table.insert(name.clone(), value.clone());
                headers.push((name, value));
            } else if first & 0x20 != 0 {
                buf.advance(1);
                let new_size = decode_integer(&mut buf, first, 5)?;
                self.table.set_max_size(new_size as usize);
            } else {
                // "never indexed" (0x10) and "without indexing" (0x00) share
                // the same 4-bit-prefix wire shape and only differ in
                // re-transmission intent, which this layer does not preserve.
                buf.advance(1);
                let (name, value) = self.decode_literal(&mut buf, first, 4)?;
                headers.push((name, value));
            }
        }

        Ok(headers)
    }

    fn lookup(&self, index: u64) -> Result<(String, String)> {
        let index = index as usize;
        if index == 0 {
            return Err(Error::hpack_decode().with_where("http2::hpack::decoder: index zero"));
        }
        if index <= static_table::LENGTH {
            let (name, value) = static_table::lookup(index)
                .ok_or_else(|| Error::hpack_decode().with_where("http2::hpack::decoder: bad static index"))?;
            return Ok((name.to_string(), value.to_string()));
        }
        let dynamic_index = index - static_table::LENGTH;
        self.table
            .get(dynamic_index)
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .ok_or_else(|| Error::hpack_decode().with_where("http2::hpack::decoder: bad dynamic index"))
    }

    fn decode_literal(&self, buf: &mut Bytes, first: u8, prefix_len: u8) -> Result<(String, String)> {
        let name_index = decode_integer(buf, first, prefix_len)?;
        let name = if name_index == 0 {
            decode_string(buf)?
        } else {
            self.lookup(name_index)?.0
        };
        let value = decode_string(buf)?;
        Ok((name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn decodes_a_static_indexed_field() {
        let mut decoder = Decoder::new(4096);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x82]); // indexed, :method: GET (static index 2)
        let headers = decoder.decode(&buf.freeze()).unwrap();
        assert_eq!(headers, vec![(":method".to_string(), "GET".to_string())]);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut decoder = Decoder::new(4096);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0xFF, 0x7F]); // huge indexed representation
        assert!(decoder.decode(&buf.freeze()).is_err());
    }
}
