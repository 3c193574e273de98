/// Normalizes extracted document text before it is put into a prompt.
///
/// - line endings become `\n`
/// - control characters other than newline and tab are dropped
/// - trailing whitespace is trimmed on every line
/// - runs of blank lines collapse to a single blank line
pub fn sanitize_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(normalized.len());
    let mut blank_run = 0usize;

    for line in normalized.split('\n') {
        let cleaned: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let cleaned = cleaned.trim_end();

        if cleaned.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(cleaned);
            out.push('\n');
        }
    }

    out.trim().to_string()
}
