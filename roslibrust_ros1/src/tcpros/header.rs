//! The TCPROS connection header: a length-prefixed block of length-prefixed `key=value`
//! entries, exchanged once per connection before any message frames.

use std::collections::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    #[error("header entry is missing a '=' separator")]
    MalformedEntry,
    #[error("header entry is not valid UTF-8")]
    NotUtf8,
    #[error("declared entry length {declared} runs past the end of the header block ({remaining} bytes left)")]
    LengthMismatch { declared: u32, remaining: usize },
}

/// Encodes `pairs` as a complete TCPROS header frame: the entries block, prefixed with its
/// own `u32` total length. The result is ready to write directly to the socket.
pub fn encode(pairs: &[(String, String)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, value) in pairs {
        let entry = format!("{key}={value}");
        body.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        body.extend_from_slice(entry.as_bytes());
    }
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decodes a header block's *payload* (i.e. with the outer frame length already stripped
/// by the frame reader) into a key/value map. Duplicate keys: last one wins.
pub fn decode(payload: &[u8]) -> Result<HashMap<String, String>, HeaderError> {
    let mut map = HashMap::new();
    let mut cursor = 0usize;
    while cursor < payload.len() {
        if cursor + 4 > payload.len() {
            return Err(HeaderError::LengthMismatch {
                declared: 0,
                remaining: payload.len() - cursor,
            });
        }
        let declared = u32::from_le_bytes(payload[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let declared_usize = declared as usize;
        if cursor + declared_usize > payload.len() {
            return Err(HeaderError::LengthMismatch {
                declared,
                remaining: payload.len() - cursor,
            });
        }
        let entry = std::str::from_utf8(&payload[cursor..cursor + declared_usize])
            .map_err(|_| HeaderError::NotUtf8)?;
        cursor += declared_usize;

        let eq = entry.find('=').ok_or(HeaderError::MalformedEntry)?;
        let (key, rest) = entry.split_at(eq);
        map.insert(key.to_string(), rest[1..].to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(input: &[(&str, &str)]) -> Vec<(String, String)> {
        input.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn round_trips_simple_map() {
        let input = pairs(&[("topic", "/chatter"), ("md5sum", "abc123"), ("callerid", "/listener")]);
        let framed = encode(&input);
        let decoded = decode(&framed[4..]).unwrap();
        assert_eq!(decoded.get("topic"), Some(&"/chatter".to_string()));
        assert_eq!(decoded.get("md5sum"), Some(&"abc123".to_string()));
        assert_eq!(decoded.get("callerid"), Some(&"/listener".to_string()));
        assert_eq!(decoded.len(), 3);
    }

    #[test]
    fn allows_equals_sign_in_value() {
        let input = pairs(&[("key", "a=b=c")]);
        let framed = encode(&input);
        let decoded = decode(&framed[4..]).unwrap();
        assert_eq!(decoded.get("key"), Some(&"a=b=c".to_string()));
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let input = pairs(&[("topic", "/first"), ("topic", "/second")]);
        let framed = encode(&input);
        let decoded = decode(&framed[4..]).unwrap();
        assert_eq!(decoded.get("topic"), Some(&"/second".to_string()));
    }

    #[test]
    fn empty_map_round_trips() {
        let framed = encode(&[]);
        let decoded = decode(&framed[4..]).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn missing_equals_is_malformed() {
        let mut body = Vec::new();
        let entry = b"no_equals_here";
        body.extend_from_slice(&(entry.len() as u32).to_le_bytes());
        body.extend_from_slice(entry);
        let err = decode(&body).unwrap_err();
        assert!(matches!(err, HeaderError::MalformedEntry));
    }

    #[test]
    fn truncated_entry_is_length_mismatch() {
        let mut body = Vec::new();
        body.extend_from_slice(&100u32.to_le_bytes());
        body.extend_from_slice(b"short");
        let err = decode(&body).unwrap_err();
        assert!(matches!(err, HeaderError::LengthMismatch { .. }));
    }

    #[test]
    fn random_ascii_maps_round_trip() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let n = rng.gen_range(0..8);
            let mut input = Vec::new();
            for i in 0..n {
                let key = format!("k{i}");
                let value_len = rng.gen_range(0..16);
                let value: String = (0..value_len)
                    .map(|_| (b'a' + rng.gen_range(0..26)) as char)
                    .collect();
                input.push((key, value));
            }
            let framed = encode(&input);
            let decoded = decode(&framed[4..]).unwrap();
            for (k, v) in &input {
                assert_eq!(decoded.get(k), Some(v));
            }
        }
    }
}
