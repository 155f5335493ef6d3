//! HPACK header-list encoding (RFC 7541 §6): turns a header block into the
//! representations written onto a HEADERS/CONTINUATION frame payload.

use bytes::BytesMut;

use super::dynamic_table::DynamicTable;
use super::primitive::{encode_integer, encode_string};
use super::static_table::{self, find_exact, find_name};

pub struct Encoder {
    table: DynamicTable,
}

impl Encoder {
    pub fn new(max_dynamic_table_size: usize) -> Encoder {
        Encoder {
            table: DynamicTable::new(max_dynamic_table_size),
        }
    }

    /// Apply a SETTINGS_HEADER_TABLE_SIZE change from the peer's ack, or our
    /// own lowering of the announced size (RFC 7541 §6.3).
    pub fn set_max_dynamic_table_size(&mut self, size: usize) {
        self.table.set_max_size(size);
    }

    /// Encode `headers` (in caller-determined order — pseudo-headers must
    /// precede regular ones) into `out`, indexing every field that isn't
    /// marked sensitive.
    pub fn encode(&mut self, headers: &[(String, String, bool)], out: &mut BytesMut) {
        for (name, value, sensitive) in headers {
            if *sensitive {
                self.encode_never_indexed(name, value, out);
                continue;
            }
            let index = find_exact(name, value)
                .or_else(|| self.table.find_exact(name, value).map(|i| i + static_table::LENGTH));
            if let Some(index) = index {
                encode_integer(out, 0x80, 7, index as u64);
                continue;
            }
            self.encode_with_incremental_indexing(name, value, out);
        }
    }

    fn encode_with_incremental_indexing(&mut self, name: &str, value: &str, out: &mut BytesMut) {
        let index = find_name(name).or_else(|| self.table.find_name(name).map(|i| i + static_table::LENGTH));
        match index {
            Some(index) => encode_integer(out, 0x40, 6, index as u64),
            None => {
                out.extend_from_slice(&[0x40]);
                encode_string(out, name);
            }
        }
        encode_string(out, value);
        self.table.insert(name.to_string(), value.to_string());
    }

    fn encode_never_indexed(&self, name: &str, value: &str, out: &mut BytesMut) {
        match find_name(name) {
            Some(index) => encode_integer(out, 0x10, 4, index as u64),
            None => {
                out.extend_from_slice(&[0x10]);
                encode_string(out, name);
            }
        }
        encode_string(out, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::decoder::Decoder;

    #[test]
    fn round_trips_through_decoder() {
        let mut encoder = Encoder::new(4096);
        let mut decoder = Decoder::new(4096);
        let headers = vec![
            (":method".to_string(), "GET".to_string(), false),
            (":path".to_string(), "/trace".to_string(), false),
            ("x-request-id".to_string(), "abc-123".to_string(), false),
        ];
        let mut buf = BytesMut::new();
        encoder.encode(&headers, &mut buf);

        let decoded = decoder.decode(&buf.freeze()).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], (":method".to_string(), "GET".to_string()));
        assert_eq!(decoded[2], ("x-request-id".to_string(), "abc-123".to_string()));
    }

    #[test]
    fn reuses_dynamic_entries_on_repeat() {
        let mut encoder = Encoder::new(4096);
        let mut decoder = Decoder::new(4096);
        let headers = vec![("x-trace".to_string(), "same-value".to_string(), false)];
        let mut first = BytesMut::new();
        encoder.encode(&headers, &mut first);
        let mut second = BytesMut::new();
        encoder.encode(&headers, &mut second);
        assert!(second.len() < first.len());

        let decoded_first = decoder.decode(&first.freeze()).unwrap();
        assert_eq!(decoded_first, vec![("x-trace".to_string(), "same-value".to_string())]);
        let decoded_second = decoder.decode(&second.freeze()).unwrap();
        assert_eq!(decoded_second, vec![("x-trace".to_string(), "same-value".to_string())]);
    }
}
