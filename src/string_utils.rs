//! Conversions between char indices (what egui cursors use), byte offsets
//! (what `str` slicing uses) and line/column positions.

// ─────────────────────────────────────────────────────────────────────────────
// Char / byte
// ─────────────────────────────────────────────────────────────────────────────

/// Byte offset of the `char_index`-th char, clamped to the string length.
pub fn char_to_byte(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Number of chars before `byte_index`, rounding down inside a multi-byte char.
pub fn byte_to_char(s: &str, byte_index: usize) -> usize {
    let mut index = byte_index.min(s.len());
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    s[..index].chars().count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Lines
// ─────────────────────────────────────────────────────────────────────────────

/// Byte offset where the line containing `byte_index` starts.
pub fn line_start(s: &str, byte_index: usize) -> usize {
    s[..byte_index.min(s.len())]
        .rfind('\n')
        .map_or(0, |i| i + 1)
}

/// Byte offset of the `\n` ending the line containing `byte_index`, or the text end.
pub fn line_end(s: &str, byte_index: usize) -> usize {
    let from = byte_index.min(s.len());
    s[from..].find('\n').map_or(s.len(), |i| from + i)
}

/// Zero-based (line, column) of a char index; the column counts chars.
pub fn char_index_to_line_col(s: &str, char_index: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    for (i, ch) in s.chars().enumerate() {
        if i >= char_index {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_byte_conversion() {
        let s = "中文 ok";
        assert_eq!(char_to_byte(s, 0), 0);
        assert_eq!(char_to_byte(s, 1), 3);
        assert_eq!(char_to_byte(s, 3), 7);
        assert_eq!(char_to_byte(s, 99), s.len());
        assert_eq!(byte_to_char(s, 3), 1);
        assert_eq!(byte_to_char(s, 4), 1);
        assert_eq!(byte_to_char(s, 99), 5);
    }

    #[test]
    fn test_line_bounds() {
        let s = "ab\n中文\n";
        assert_eq!(line_start(s, 6), 3);
        assert_eq!(line_end(s, 6), 9);
        assert_eq!(line_start(s, 1), 0);
        assert_eq!(line_end(s, 0), 2);
        assert_eq!(line_start(s, s.len()), s.len());
    }

    #[test]
    fn test_char_index_to_line_col() {
        let s = "第一行\nsecond\n\nlast";
        assert_eq!(char_index_to_line_col(s, 0), (0, 0));
        assert_eq!(char_index_to_line_col(s, 3), (0, 3));
        assert_eq!(char_index_to_line_col(s, 4), (1, 0));
        assert_eq!(char_index_to_line_col(s, 12), (3, 0));
        assert_eq!(char_index_to_line_col(s, 99), (3, 4));
    }
}
