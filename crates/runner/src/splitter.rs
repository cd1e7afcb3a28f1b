use configuration::SplitMode;

/// One fragment of the queries file.
///
/// `index` is the 1-based position of the fragment in the full split
/// sequence, blank fragments included. It names the result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement<'a> {
    pub index: usize,
    pub sql: &'a str,
}

impl Statement<'_> {
    /// Whitespace-only fragments are skipped but keep their index.
    pub fn is_blank(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// Splits the queries file text into positional fragments.
pub fn split_statements(text: &str, mode: SplitMode) -> Vec<Statement<'_>> {
    let fragments = match mode {
        SplitMode::Naive => text.split(';').collect(),
        SplitMode::SqlAware => split_sql_aware(text),
    };

    fragments
        .into_iter()
        .enumerate()
        .map(|(i, sql)| Statement { index: i + 1, sql })
        .collect()
}

/// Splits on `;` outside of literals, quoted identifiers, dollar-quoted
/// bodies and comments. Like `str::split`, `n` top-level separators always
/// yield `n + 1` fragments.
fn split_sql_aware(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b';' => {
                fragments.push(&text[start..i]);
                start = i + 1;
                i += 1;
            }
            b'\'' => {
                let backslash_escapes = is_escape_string_prefix(bytes, i);
                i = skip_quoted(bytes, i, b'\'', backslash_escapes);
            }
            b'"' => i = skip_quoted(bytes, i, b'"', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'$' => match dollar_tag(bytes, i) {
                Some(tag_len) => i = skip_dollar_quoted(bytes, i, tag_len),
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    fragments.push(&text[start..]);
    fragments
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// `E'...'` strings honour backslash escapes.
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    quote >= 1
        && matches!(bytes[quote - 1], b'E' | b'e')
        && (quote == 1 || !is_ident_byte(bytes[quote - 2]))
}

/// Returns the index just past the closing quote. A doubled quote is an
/// escaped quote. Unterminated literals run to the end of the text.
fn skip_quoted(bytes: &[u8], open: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
        } else if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Block comments nest in PostgreSQL.
fn skip_block_comment(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// If a dollar-quote tag (`$$` or `$name$`) opens at `at`, returns its length.
fn dollar_tag(bytes: &[u8], at: usize) -> Option<usize> {
    // `a$b` is part of an identifier, `$1` a parameter.
    if at > 0 && is_ident_byte(bytes[at - 1]) {
        return None;
    }
    let rest = &bytes[at + 1..];
    let first = *rest.first()?;
    if first == b'$' {
        return Some(2);
    }
    if !(first.is_ascii_alphabetic() || first == b'_' || first >= 0x80) {
        return None;
    }
    let name_len = rest
        .iter()
        .position(|&b| !(b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80))?;
    (rest[name_len] == b'$').then_some(name_len + 2)
}

fn skip_dollar_quoted(bytes: &[u8], open: usize, tag_len: usize) -> usize {
    let tag = &bytes[open..open + tag_len];
    let body_start = open + tag_len;
    bytes[body_start..]
        .windows(tag_len)
        .position(|window| window == tag)
        .map_or(bytes.len(), |p| body_start + p + tag_len)
}
