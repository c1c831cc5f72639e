//! Wii path validation and host filename escaping.

use crate::types::MAX_PATH_LENGTH;

pub fn is_valid_non_root_path(path: &str) -> bool {
    path.len() > 1 && path.len() <= MAX_PATH_LENGTH && path.starts_with('/') && !path.ends_with('/')
}

pub fn is_valid_path(path: &str) -> bool {
    path == "/" || is_valid_non_root_path(path)
}

pub fn is_printable(path: &str) -> bool {
    path.bytes().all(|b| (0x20..0x7F).contains(&b))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPath<'a> {
    pub parent: &'a str,
    pub file_name: &'a str,
}

/// Split `/a/b/c` into `/a/b` and `c`. The parent of a top-level entry is
/// `/`.
pub fn split_path_and_basename(path: &str) -> SplitPath<'_> {
    match path.rfind('/') {
        Some(0) => SplitPath {
            parent: "/",
            file_name: &path[1..],
        },
        Some(pos) => SplitPath {
            parent: &path[..pos],
            file_name: &path[pos + 1..],
        },
        None => SplitPath {
            parent: "/",
            file_name: path,
        },
    }
}

fn is_illegal_character(c: char) -> bool {
    matches!(c, '\0'..='\x1F' | '"' | '*' | '/' | ':' | '<' | '>' | '?' | '\\' | '|' | '\x7F')
}

/// Escape one path component so that any Wii filename is a legal host
/// filename. `__` itself is escaped so the encoding is reversible.
pub fn escape_file_name(name: &str) -> String {
    if name.chars().all(|c| c == '.') {
        return name.replace('.', "__2e__");
    }
    let doubled = name.replace("__", "__5f____5f__");
    let mut out = String::with_capacity(doubled.len());
    for c in doubled.chars() {
        if is_illegal_character(c) {
            out.push_str(&format!("__{:02x}__", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Escape every component of a `/`-separated path.
pub fn escape_path(path: &str) -> String {
    path.split('/')
        .map(escape_file_name)
        .collect::<Vec<_>>()
        .join("/")
}

/// Reverse [`escape_file_name`].
pub fn unescape_file_name(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if i + 6 <= bytes.len() && &bytes[i..i + 2] == b"__" && &bytes[i + 4..i + 6] == b"__" {
            let decoded = std::str::from_utf8(&bytes[i + 2..i + 4])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(c) = decoded {
                out.push(c);
                i += 6;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
