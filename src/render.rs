//! Column helpers for terminal output (display width, not byte length).

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Cut `text` to at most `width` columns, marking the cut with `…`.
pub fn truncate(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Truncate, then pad with spaces to exactly `width` columns.
pub fn fit(text: &str, width: usize) -> String {
    let mut out = truncate(text, width);
    let w = UnicodeWidthStr::width(out.as_str());
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(w)));
    out
}

/// First line of `text`, whitespace-trimmed, cut to `width`.
pub fn preview(text: &str, width: usize) -> String {
    truncate(text.lines().next().unwrap_or("").trim(), width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_columns() {
        assert_eq!(truncate("Cartón", 6), "Cartón");
        assert_eq!(truncate("Cartón de mudanza", 8), "Cartón …");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn test_fit_pads() {
        assert_eq!(fit("Ñandú", 7), "Ñandú  ");
        assert_eq!(UnicodeWidthStr::width(fit("Electrónico reciclado", 10).as_str()), 10);
    }

    #[test]
    fn test_preview_first_line() {
        assert_eq!(preview("  Hola\nsegunda línea", 20), "Hola");
    }
}
