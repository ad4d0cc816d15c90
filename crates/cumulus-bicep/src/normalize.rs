/// Normalize converter output: no BOM, LF line endings, no trailing blank
/// lines, exactly one final newline. Whitespace-only input becomes empty.
pub fn normalize(raw: &str) -> String {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = text.trim_end();
    if trimmed.trim_start().is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push_str(trimmed);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_becomes_lf() {
        assert_eq!(normalize("param a string\r\nparam b string\r\n"), "param a string\nparam b string\n");
    }

    #[test]
    fn trailing_blank_lines_collapse_to_one_newline() {
        assert_eq!(normalize("resource x\n\n\n  "), "resource x\n");
        assert_eq!(normalize("resource x"), "resource x\n");
    }

    #[test]
    fn bom_and_blank_output_are_dropped() {
        assert_eq!(normalize("\u{feff}param a string\n"), "param a string\n");
        assert_eq!(normalize(" \r\n\t"), "");
    }
}
