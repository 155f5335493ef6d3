//! The fixed 61-entry HPACK static table (RFC 7541 Appendix A).

pub const STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Static-table indices are 1-based per RFC 7541 §2.3.3.
pub fn lookup(index: usize) -> Option<(&'static str, &'static str)> {
    if index == 0 {
        return None;
    }
    STATIC_TABLE.get(index - 1).copied()
}

/// Find an exact name+value match, returning a 1-based index.
pub fn find_exact(name: &str, value: &str) -> Option<usize> {
    STATIC_TABLE
        .iter()
        .position(|&(n, v)| n == name && v == value)
        .map(|i| i + 1)
}

/// Find the first entry whose name matches, returning a 1-based index. Used
/// for the "literal with incremental indexing, name from table" encoding.
pub fn find_name(name: &str) -> Option<usize> {
    STATIC_TABLE.iter().position(|&(n, _)| n == name).map(|i| i + 1)
}

pub const LENGTH: usize = STATIC_TABLE.len();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_sixty_one_entries() {
        assert_eq!(LENGTH, 61);
    }

    #[test]
    fn looks_up_known_entries() {
        assert_eq!(lookup(1), Some((":authority", "")));
        assert_eq!(lookup(2), Some((":method", "GET")));
        assert_eq!(lookup(61), Some(("www-authenticate", "")));
        assert_eq!(lookup(62), None);
        assert_eq!(lookup(0), None);
    }

    #[test]
    fn finds_exact_and_name_only_matches() {
        assert_eq!(find_exact(":method", "POST"), Some(3));
        assert_eq!(find_exact(":method", "PUT"), None);
        assert_eq!(find_name(":method"), Some(2));
    }
}
