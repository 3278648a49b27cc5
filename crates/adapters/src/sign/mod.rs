//! Request-signing helpers shared by the cloud REST adapters.

pub mod sas;
pub mod sigv4;

pub use sas::sas_token;
pub use sigv4::SigV4Signer;

/// RFC 3986 percent-encoding over the unreserved set.
///
/// `encode_slash` controls whether `/` is escaped (true for query values and
/// SigV4 canonical query strings, false for URI paths).
pub fn percent_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(percent_encode("a b&c=d", true), "a%20b%26c%3Dd");
        assert_eq!(percent_encode("path/to/key", false), "path/to/key");
        assert_eq!(percent_encode("path/to/key", true), "path%2Fto%2Fkey");
    }

    #[test]
    fn unreserved_passes_through() {
        assert_eq!(percent_encode("AZaz09-_.~", true), "AZaz09-_.~");
    }
}
