//! Line framing for the master's operation log (spec.md §4.3): each line is
//! `<action_code>|||<payload>\n`. The payload itself is a JSON literal,
//! parsed by the caller (`gfs-master::operation_log`) into a typed
//! `OpRecord` — this module only owns the separator convention so both the
//! writer and the replayer agree on it in one place.

pub const SEPARATOR: &str = "|||";

/// Formats one operation-log line (without the trailing newline).
pub fn encode_line(action_code: &str, payload_json: &str) -> String {
    format!("{action_code}{SEPARATOR}{payload_json}")
}

/// Splits a line into `(action_code, payload_json)`. Returns `None` for a
/// malformed line (missing separator) — callers log and skip rather than
/// abort recovery (spec.md §7).
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return None;
    }
    line.split_once(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let line = encode_line("CREATE_FILE", "\"/a\"");
        let (code, payload) = parse_line(&line).unwrap();
        assert_eq!(code, "CREATE_FILE");
        assert_eq!(payload, "\"/a\"");
    }

    #[test]
    fn rejects_line_without_separator() {
        assert_eq!(parse_line("garbage"), None);
    }

    #[test]
    fn ignores_blank_lines() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("\n"), None);
    }
}
