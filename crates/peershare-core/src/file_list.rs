//! File-list literals used by the client-side `download` command:
//! `[{a.txt},{b.txt}]`.

/// Usage hint included in validation messages.
pub const FILE_LIST_FORMAT: &str = "[{<path_to_file>},...]";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileListError {
    #[error("file list {0:?} must be enclosed in brackets: {}", FILE_LIST_FORMAT)]
    NotBracketed(String),

    #[error("file list {0:?} contains an empty entry")]
    EmptyEntry(String),

    #[error("file list is empty")]
    Empty,

    #[error("expected exactly two file lists, found {0}")]
    WrongListCount(usize),

    #[error("source list has {source_count} files but destination list has {destination_count}")]
    LengthMismatch {
        source_count: usize,
        destination_count: usize,
    },
}

/// Parse one bracketed list. All whitespace inside is stripped and each
/// entry may be wrapped in `{}`.
pub fn parse_file_list(literal: &str) -> Result<Vec<String>, FileListError> {
    let compact: String = literal.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = compact
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| FileListError::NotBracketed(literal.to_string()))?;

    if inner.is_empty() {
        return Err(FileListError::Empty);
    }

    inner
        .split(',')
        .map(|entry| {
            let path = entry
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .unwrap_or(entry);
            if path.is_empty() {
                Err(FileListError::EmptyEntry(literal.to_string()))
            } else {
                Ok(path.to_string())
            }
        })
        .collect()
}

/// Extract the source and destination lists from the text following the
/// identity in a `download` command, pairing them up in order.
///
/// The text is scanned for bracketed groups, so whitespace inside a literal
/// (which the command parser would have split on) is tolerated.
pub fn parse_transfer_pairs(text: &str) -> Result<Vec<(String, String)>, FileListError> {
    let groups = bracketed_groups(text)?;
    if groups.len() != 2 {
        return Err(FileListError::WrongListCount(groups.len()));
    }
    let sources = parse_file_list(groups[0])?;
    let destinations = parse_file_list(groups[1])?;
    if sources.len() != destinations.len() {
        return Err(FileListError::LengthMismatch {
            source_count: sources.len(),
            destination_count: destinations.len(),
        });
    }
    Ok(sources.into_iter().zip(destinations).collect())
}

fn bracketed_groups(text: &str) -> Result<Vec<&str>, FileListError> {
    let mut groups = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(FileListError::NotBracketed(rest.to_string()));
        }
        let end = rest
            .find(']')
            .ok_or_else(|| FileListError::NotBracketed(rest.to_string()))?;
        groups.push(&rest[..=end]);
        rest = rest[end + 1..].trim_start();
    }
    Ok(groups)
}
