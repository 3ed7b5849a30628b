//! Recognizes DLT log records in the textual line stream.
//!
//! Works on the line format produced by `dlt-receive` and `dlt-convert -a`:
//! after some leading columns the line carries the ECU id, the application
//! id, the context id (each a 1-4 character token, padded to four characters
//! with trailing dashes), the literal `log` marker, the level, and finally
//! the payload in square brackets.

use crate::error::AnalyzeError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Everything after the first `[` is the payload tail.
static PAYLOAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*)$").unwrap());

/// A single matched log record. Lives only while its line is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub app_id: String,
    pub context_id: String,
    pub is_debug: bool,
    pub is_verbose: bool,
    /// Byte length of the bracketed payload.
    pub payload_len: usize,
}

/// Matches lines against the configured ECU and optional app/context
/// filters, and applies the severity inclusion rules.
pub struct RecordClassifier {
    line_re: Regex,
    include_debug: bool,
    include_verbose: bool,
}

impl RecordClassifier {
    pub fn new(
        ecu: &str,
        app_filter: Option<&str>,
        context_filter: Option<&str>,
        include_debug: bool,
        include_verbose: bool,
    ) -> Result<Self, AnalyzeError> {
        // Ids shorter than four characters are rendered with trailing
        // dashes, so every id token may carry up to three of them.
        let id_token = |filter: Option<&str>| match filter {
            Some(value) => format!("{}-{{0,3}}", regex::escape(value)),
            None => r"\w{1,4}-{0,3}".to_string(),
        };
        let pattern = format!(
            r"{}-{{0,3}}\s+({})\s+({})\s+log",
            regex::escape(ecu),
            id_token(app_filter),
            id_token(context_filter),
        );

        Ok(RecordClassifier {
            line_re: Regex::new(&pattern)?,
            include_debug,
            include_verbose,
        })
    }

    /// Classify one raw line. Returns `None` for anything that should not
    /// count towards the measurement: lines missing the id triad or the
    /// `log` marker, debug/verbose records when their inclusion flag is
    /// off, and lines without a well-formed payload tail.
    pub fn classify(&self, line: &str) -> Option<Record> {
        let caps = self.line_re.captures(line)?;
        let app_id = caps[1].trim_end_matches('-').to_string();
        let context_id = caps[2].trim_end_matches('-').to_string();

        let is_debug = line.contains("log debug");
        let is_verbose = line.contains("log verbose");
        if (is_debug && !self.include_debug) || (is_verbose && !self.include_verbose) {
            return None;
        }

        let payload_len = payload_size(line)?;

        Some(Record {
            app_id,
            context_id,
            is_debug,
            is_verbose,
            payload_len,
        })
    }
}

/// Byte length of the payload between the first `[` and the trailing `]`.
/// A tail that does not close with `]` is malformed and rejected.
fn payload_size(line: &str) -> Option<usize> {
    let caps = PAYLOAD_RE.captures(line)?;
    let tail = caps[1].trim();
    let payload = tail.strip_suffix(']')?;
    Some(payload.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a line in the shape `dlt-convert -a` emits. Ids are padded to
    /// four characters with dashes like the DLT tools do.
    fn dlt_line(ecu: &str, app: &str, ctx: &str, level: &str, payload: &str) -> String {
        format!(
            "42 2024/08/21 10:03:11.013421 2054.1572 001 {:-<4} {:-<4} {:-<4} log {} V 1 [{}]",
            ecu, app, ctx, level, payload
        )
    }

    fn classifier(app: Option<&str>, ctx: Option<&str>) -> RecordClassifier {
        RecordClassifier::new("ECU1", app, ctx, false, false).unwrap()
    }

    #[test]
    fn matches_log_line_and_strips_dash_padding() {
        let c = classifier(None, None);
        let record = c
            .classify(&dlt_line("ECU1", "APP", "CT", "info", "hello world"))
            .unwrap();

        assert_eq!(record.app_id, "APP");
        assert_eq!(record.context_id, "CT");
        assert!(!record.is_debug);
        assert!(!record.is_verbose);
        assert_eq!(record.payload_len, "hello world".len());
    }

    #[test]
    fn rejects_other_ecu() {
        let c = classifier(None, None);
        assert!(c.classify(&dlt_line("ECU2", "APP1", "CTX1", "info", "x")).is_none());
    }

    #[test]
    fn rejects_lines_without_log_marker() {
        let c = classifier(None, None);
        let line = "17 2024/08/21 10:03:12.000000 2054.1600 001 ECU1 APP1 CTX1 control response N 1 [ok]";
        assert!(c.classify(line).is_none());
    }

    #[test]
    fn app_filter_limits_matches() {
        let c = classifier(Some("APP1"), None);
        assert!(c.classify(&dlt_line("ECU1", "APP1", "CTX1", "info", "x")).is_some());
        assert!(c.classify(&dlt_line("ECU1", "APP2", "CTX1", "info", "x")).is_none());
    }

    #[test]
    fn context_filter_limits_matches() {
        let c = classifier(Some("APP1"), Some("CTX1"));
        assert!(c.classify(&dlt_line("ECU1", "APP1", "CTX1", "info", "x")).is_some());
        assert!(c.classify(&dlt_line("ECU1", "APP1", "CTX2", "info", "x")).is_none());
    }

    #[test]
    fn short_filter_matches_padded_id() {
        let c = classifier(Some("AP"), None);
        let record = c.classify(&dlt_line("ECU1", "AP", "CTX1", "info", "x")).unwrap();
        assert_eq!(record.app_id, "AP");
    }

    #[test]
    fn overlong_id_token_never_matches() {
        let c = classifier(None, None);
        let line = "1 2024/08/21 10:03:11.000000 2054.0 001 ECU1 TOOLONG CTX1 log info V 1 [x]";
        assert!(c.classify(line).is_none());
    }

    #[test]
    fn debug_lines_skipped_unless_included() {
        let line = dlt_line("ECU1", "APP1", "CTX1", "debug", "dbg payload");

        assert!(classifier(None, None).classify(&line).is_none());

        let including = RecordClassifier::new("ECU1", None, None, true, false).unwrap();
        let record = including.classify(&line).unwrap();
        assert!(record.is_debug);
        assert_eq!(record.payload_len, "dbg payload".len());
    }

    #[test]
    fn verbose_lines_skipped_unless_included() {
        let line = dlt_line("ECU1", "APP1", "CTX1", "verbose", "vvv");

        assert!(classifier(None, None).classify(&line).is_none());

        let including = RecordClassifier::new("ECU1", None, None, false, true).unwrap();
        assert!(including.classify(&line).is_some());
    }

    #[test]
    fn payload_length_counts_bytes_between_brackets() {
        assert_eq!(payload_size("prefix [abc]"), Some(3));
        assert_eq!(payload_size("prefix []"), Some(0));
        // Surrounding whitespace is trimmed before the closing bracket.
        assert_eq!(payload_size("prefix [abc]  "), Some(3));
        // Whitespace inside the brackets counts, except after trimming ends.
        assert_eq!(payload_size("prefix [ hello ]"), Some("hello ".len()));
    }

    #[test]
    fn malformed_payload_tail_is_rejected() {
        let c = classifier(None, None);

        // No opening bracket.
        let line = "3 2024/08/21 10:03:11.000000 2054.0 001 ECU1 APP1 CTX1 log info V 1";
        assert!(c.classify(line).is_none());

        // Missing closing bracket.
        let line = "4 2024/08/21 10:03:11.000000 2054.0 001 ECU1 APP1 CTX1 log info V 1 [truncated";
        assert!(c.classify(line).is_none());
    }

    #[test]
    fn filter_values_are_literal_not_patterns() {
        let c = classifier(Some("A.P1"), None).line_re.to_owned();
        // The dot must not act as a wildcard.
        assert!(!c.is_match("1 ... ECU1 AXP1 CTX1 log info V 1 [x]"));
    }
}
