//! Minimal PNG text-chunk reader/writer.
//!
//! Only `tEXt` and uncompressed `iTXt` chunks are understood; every other
//! chunk is carried through byte for byte.

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
    raw: &'a [u8],
}

pub fn is_png(bytes: &[u8]) -> bool {
    bytes.len() >= SIGNATURE.len() && bytes[..SIGNATURE.len()] == SIGNATURE
}

fn chunks(bytes: &[u8]) -> Option<Vec<Chunk<'_>>> {
    if !is_png(bytes) {
        return None;
    }
    let mut out = Vec::new();
    let mut offset = SIGNATURE.len();
    while offset + 12 <= bytes.len() {
        let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().ok()?) as usize;
        let end = offset.checked_add(12)?.checked_add(len)?;
        if end > bytes.len() {
            return None;
        }
        let kind: [u8; 4] = bytes[offset + 4..offset + 8].try_into().ok()?;
        out.push(Chunk {
            kind,
            data: &bytes[offset + 8..offset + 8 + len],
            raw: &bytes[offset..end],
        });
        offset = end;
        if &kind == b"IEND" {
            break;
        }
    }
    Some(out)
}

fn split_keyword(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let nul = data.iter().position(|b| *b == 0)?;
    Some((&data[..nul], &data[nul + 1..]))
}

fn decode_text(kind: &[u8; 4], data: &[u8]) -> Option<(String, String)> {
    let (keyword, rest) = split_keyword(data)?;
    let keyword = String::from_utf8_lossy(keyword).into_owned();
    match kind {
        b"tEXt" => {
            // tEXt is Latin-1.
            let text: String = rest.iter().map(|b| *b as char).collect();
            Some((keyword, text))
        }
        b"iTXt" => {
            let (&compressed, rest) = rest.split_first()?;
            if compressed != 0 {
                return None;
            }
            let (_method, rest) = rest.split_first()?;
            let (_language, rest) = split_keyword(rest)?;
            let (_translated, text) = split_keyword(rest)?;
            Some((keyword, String::from_utf8_lossy(text).into_owned()))
        }
        _ => None,
    }
}

/// Every readable text entry, in file order.
pub fn text_entries(bytes: &[u8]) -> Vec<(String, String)> {
    chunks(bytes)
        .unwrap_or_default()
        .iter()
        .filter_map(|chunk| decode_text(&chunk.kind, chunk.data))
        .collect()
}

/// Rewrite the file with `entries` as `iTXt` chunks, replacing existing text
/// chunks that use the same keywords. `None` when the bytes are not a PNG.
pub fn replace_text_entries(bytes: &[u8], entries: &[(&str, String)]) -> Option<Vec<u8>> {
    let chunks = chunks(bytes)?;
    let mut out = Vec::with_capacity(bytes.len() + 256);
    out.extend_from_slice(&SIGNATURE);

    for chunk in &chunks {
        if &chunk.kind == b"IEND" {
            for (keyword, text) in entries {
                write_itxt(&mut out, keyword, text);
            }
        }
        let replaced = matches!(&chunk.kind, b"tEXt" | b"iTXt")
            && split_keyword(chunk.data).is_some_and(|(keyword, _)| {
                entries.iter().any(|(key, _)| key.as_bytes() == keyword)
            });
        if !replaced {
            out.extend_from_slice(chunk.raw);
        }
    }
    Some(out)
}

fn write_itxt(out: &mut Vec<u8>, keyword: &str, text: &str) {
    let mut data = Vec::with_capacity(keyword.len() + text.len() + 5);
    data.extend_from_slice(keyword.as_bytes());
    // keyword NUL, uncompressed, method 0, empty language NUL, empty translation NUL
    data.extend_from_slice(&[0, 0, 0, 0, 0]);
    data.extend_from_slice(text.as_bytes());

    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(b"iTXt");
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc32(&[b"iTXt".as_slice(), data.as_slice()]).to_be_bytes());
}

fn crc32(parts: &[&[u8]]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for part in parts {
        for &byte in *part {
            crc ^= byte as u32;
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        let ihdr = [0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0];
        bytes.extend_from_slice(&(ihdr.len() as u32).to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&ihdr);
        bytes.extend_from_slice(&crc32(&[b"IHDR".as_slice(), ihdr.as_slice()]).to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"IEND");
        bytes.extend_from_slice(&crc32(&[b"IEND".as_slice()]).to_be_bytes());
        bytes
    }

    #[test]
    fn iend_crc_matches_reference() {
        assert_eq!(crc32(&[b"IEND".as_slice()]), 0xAE42_6082);
    }

    #[test]
    fn text_entries_are_replaced_not_duplicated() {
        let png = tiny_png();
        let first = replace_text_entries(&png, &[("Title", "cat".into())]).unwrap();
        let second = replace_text_entries(&first, &[("Title", "cat 2024".into())]).unwrap();

        let entries = text_entries(&second);
        assert_eq!(entries, vec![("Title".to_string(), "cat 2024".to_string())]);
        assert!(second.ends_with(&crc32(&[b"IEND".as_slice()]).to_be_bytes()));
    }

    #[test]
    fn non_png_bytes_are_left_alone() {
        assert!(replace_text_entries(b"GIF89a", &[("Title", "x".into())]).is_none());
        assert!(text_entries(b"not an image").is_empty());
    }
}
