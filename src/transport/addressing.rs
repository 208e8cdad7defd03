//! Object paths and query strings

use crate::transfer::PartSpec;
use std::borrow::Cow;
use std::fmt::Write as FmtWrite;

static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~')
}

fn push_encoded(buf: &mut String, byte: u8) {
    buf.push('%');
    buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
    buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
}

/// Encode an object key, preserving forward slashes.
/// Borrowed when nothing needs encoding.
pub fn encode_key(key: &str) -> Cow<'_, str> {
    if key.bytes().all(|b| is_unreserved(b) || b == b'/') {
        return Cow::Borrowed(key);
    }

    let mut result = String::with_capacity(key.len() + 32);
    for byte in key.bytes() {
        if is_unreserved(byte) || byte == b'/' {
            result.push(byte as char);
        } else {
            push_encoded(&mut result, byte);
        }
    }
    Cow::Owned(result)
}

/// Encode a query parameter value (RFC 3986) into `buf`
fn encode_query_value_into(buf: &mut String, s: &str) {
    for byte in s.bytes() {
        if is_unreserved(byte) {
            buf.push(byte as char);
        } else {
            push_encoded(buf, byte);
        }
    }
}

/// Request path for `key`: `/key` virtual-hosted, `/bucket/key` path-style
pub fn object_path(bucket: &str, key: &str, path_style: bool) -> String {
    let key = key.trim_start_matches('/');
    let encoded_key = encode_key(key);
    let mut path = String::with_capacity(2 + bucket.len() + encoded_key.len() + 64);
    path.push('/');
    if path_style {
        encode_query_value_into(&mut path, bucket);
        path.push('/');
    }
    path.push_str(&encoded_key);
    path
}

/// `?partNumber=N&uploadId=ID` for an upload part
pub fn push_upload_part_query(path: &mut String, part_number: u32, upload_id: &str) {
    path.push_str("?partNumber=");
    let _ = write!(path, "{}", part_number);
    path.push_str("&uploadId=");
    encode_query_value_into(path, upload_id);
}

/// `?partNumber=N` for a part download
pub fn push_download_part_query(path: &mut String, part: &PartSpec) {
    path.push_str("?partNumber=");
    let _ = write!(path, "{}", part.part_number);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key_preserves_slashes() {
        assert!(matches!(encode_key("dir/obj-1"), Cow::Borrowed("dir/obj-1")));
        assert_eq!(encode_key("my file+1.txt"), "my%20file%2B1.txt");
        assert_eq!(encode_key("a/é"), "a/%C3%A9");
    }

    #[test]
    fn test_object_path() {
        assert_eq!(object_path("bench-bucket", "obj-1", false), "/obj-1");
        assert_eq!(object_path("bench-bucket", "/obj-1", true), "/bench-bucket/obj-1");
    }

    #[test]
    fn test_part_queries() {
        let mut path = object_path("b", "big.bin", false);
        push_upload_part_query(&mut path, 3, "abc/def=");
        assert_eq!(path, "/big.bin?partNumber=3&uploadId=abc%2Fdef%3D");

        let mut path = object_path("b", "big.bin", false);
        push_download_part_query(
            &mut path,
            &PartSpec {
                part_number: 2,
                upload_id: None,
            },
        );
        assert_eq!(path, "/big.bin?partNumber=2");
    }
}
