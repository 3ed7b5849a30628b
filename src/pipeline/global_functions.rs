// src/pipeline/global_functions.rs
use crate::processors::window::WINDOW_CONTEXT;
use crate::variables::GlobalVariables;
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use dateparser;
use regex::Regex;
use starlark::starlark_module;
use starlark::values::{Heap, Value};
use starlark::values::tuple::UnpackTuple;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use once_cell::sync::Lazy;

thread_local! {
    pub(crate) static EMIT_BUFFER: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    pub(crate) static SKIP_FLAG: Cell<bool> = const { Cell::new(false) };
    pub(crate) static EXIT_FLAG: Cell<bool> = const { Cell::new(false) };
    pub(crate) static EXIT_MESSAGE: RefCell<Option<String>> = const { RefCell::new(None) };
    pub(crate) static EXIT_CODE: Cell<i32> = const { Cell::new(0) };
    pub(crate) static CURRENT_CONTEXT: RefCell<Option<(*const GlobalVariables, usize, Option<String>)>> = const { RefCell::new(None) };
    pub(crate) static DEBUG_BUFFER: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    pub(crate) static IS_DATA_MODE: Cell<bool> = const { Cell::new(false) };
    pub(crate) static CURRENT_MODULE: RefCell<Option<*const starlark::environment::Module>> = const { RefCell::new(None) };
}

// Builtin regex patterns adapted from KLP
pub static BUILTIN_REGEXES: Lazy<HashMap<&'static str, (&'static str, &'static str)>> = Lazy::new(|| {
    let mut patterns = HashMap::new();
    
    // Basic data types
    patterns.insert("duration", (r"(?:\d+\.?\d*(?:ns|us|Î¼s|ms|s|m|h|d|w|y))+", "duration (e.g., '2h30m', '1.5s')"));
    patterns.insert("email", (r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b", "email address"));
    patterns.insert("fqdn", (r"\b(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}\b", "fully qualified domain name (FQDN)"));
    patterns.insert("function", (r"\b[a-zA-Z_][a-zA-Z0-9_]*\s*\(", "function call"));
    patterns.insert("gitcommit", (r"\b[a-f0-9]{7,40}\b", "git commit hash"));
    patterns.insert("hexnum", (r"\b0x[a-fA-F0-9]+\b", "hex number with 0x prefix"));
    patterns.insert("hexcolor", (r"#[a-fA-F0-9]{3,8}\b", "hex color code"));
    patterns.insert("ipv4", (r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b", "IPv4 address"));
    patterns.insert("ipv4_port", (r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?):[0-9]+\b", "IPv4 address:port"));
    patterns.insert("ipv6", (r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b|::1\b|\b::ffff:(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b", "IPv6 address"));
    patterns.insert("isotime", (r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})\b", "ISO 8601 datetime string"));
    patterns.insert("json", (r"\{.*\}|\[.*\]", "JSON string"));
    patterns.insert("jwt", (r"\b[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\b", "JSON Web Token (JWT)"));
    patterns.insert("mac", (r"\b(?:[0-9a-fA-F]{2}[:-]){5}[0-9a-fA-F]{2}\b", "MAC address"));
    patterns.insert("md5", (r"\b[a-f0-9]{32}\b", "MD5 hash"));
    patterns.insert("num", (r"[+-]?(?:\d*\.)?\d+", "number (integer or float)"));
    patterns.insert("path", (r"(?:/[^/\s]*)+/?", "Unix file path"));
    patterns.insert("oauth", (r"\b[A-Za-z0-9_-]{20,}\b", "OAuth token"));
    patterns.insert("sha1", (r"\b[a-f0-9]{40}\b", "SHA-1 hash"));
    patterns.insert("sha256", (r"\b[a-f0-9]{64}\b", "SHA-256 hash"));
    patterns.insert("sql", (r"(?i)\b(?:SELECT|INSERT|UPDATE|DELETE|CREATE|DROP|ALTER|GRANT|REVOKE)\b.*?;?", "SQL query"));
    patterns.insert("url", (r"https?://[^\s<>]+", "URL"));
    patterns.insert("uuid", (r"\b[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}\b", "UUID"));
    patterns.insert("version", (r"\b\d+(?:\.\d+){1,3}(?:-[a-zA-Z0-9]+(?:\.[a-zA-Z0-9]+)*)?\b", "software version identifier"));
    patterns.insert("winregistry", (r"\\(?:HKEY_[A-Z_]+\\)?(?:[^\\]+\\)*[^\\]*", "Windows registry key"));
    
    patterns
});

pub fn get_pattern_list() -> Vec<(&'static str, &'static str)> {
    let mut patterns: Vec<_> = BUILTIN_REGEXES.iter()
        .map(|(name, (_, desc))| (*name, *desc))
        .collect();
    patterns.sort_by_key(|(name, _)| *name);
    patterns
}

#[starlark_module]
pub(crate) fn global_functions(builder: &mut starlark::environment::GlobalsBuilder) {
    // Control flow functions
    fn emit(text: String) -> anyhow::Result<starlark::values::none::NoneType> {
        // Check if we're in data mode by looking at the current data variable
        let is_data_mode = CURRENT_MODULE.with(|module_ptr| {
            if let Some(module_ptr) = *module_ptr.borrow() {
                unsafe {
                    if let Some(data_value) = (*module_ptr).get("data") {
                        !data_value.is_none()
                    } else {
                        false
                    }
                }
            } else {
                IS_DATA_MODE.with(|flag| flag.get()) // fallback to thread-local flag
            }
        });

        if is_data_mode {
            return Err(anyhow::anyhow!(
                "emit() can only be used in line mode (when 'data' is None)"
            ));
        }
        EMIT_BUFFER.with(|buffer| {
            buffer.borrow_mut().push(text);
        });
        Ok(starlark::values::none::NoneType)
    }

    fn emit_all<'v>(
        heap: &'v Heap,
        items: Value<'v>,
    ) -> anyhow::Result<starlark::values::none::NoneType> {
        // Check if we're in data mode by looking at the current data variable
        let is_data_mode = CURRENT_MODULE.with(|module_ptr| {
            if let Some(module_ptr) = *module_ptr.borrow() {
                unsafe {
                    if let Some(data_value) = (*module_ptr).get("data") {
                        !data_value.is_none()
                    } else {
                        false
                    }
                }
            } else {
                IS_DATA_MODE.with(|flag| flag.get()) // fallback to thread-local flag
            }
        });

        if is_data_mode {
            return Err(anyhow::anyhow!(
                "emit_all() can only be used in line mode (when 'data' is None)"
            ));
        }
        match items.iterate(heap) {
            Ok(mut iterable) => {
                EMIT_BUFFER.with(|buffer| {
                    let mut buffer = buffer.borrow_mut();
                    while let Some(item) = iterable.next() {
                        buffer.push(item.to_string());
                    }
                });
                Ok(starlark::values::none::NoneType)
            }
            Err(_) => Err(anyhow::anyhow!("emit_all() requires an iterable argument")),
        }
    }

    fn skip() -> anyhow::Result<starlark::values::none::NoneType> {
        SKIP_FLAG.with(|flag| flag.set(true));
        Ok(starlark::values::none::NoneType)
    }

    fn set_data_mode() -> anyhow::Result<starlark::values::none::NoneType> {
        IS_DATA_MODE.with(|flag| flag.set(true));
        Ok(starlark::values::none::NoneType)
    }

    fn exit<'v>(
        arg1: Option<starlark::values::Value<'v>>,
        arg2: Option<String>,
    ) -> anyhow::Result<starlark::values::none::NoneType> {
        let (code, msg) = match (arg1, arg2) {
            // exit() - no arguments
            (None, None) => (0, None),
            // exit(3) - integer as first argument
            (Some(val), None) if val.unpack_i32().is_some() => (val.unpack_i32().unwrap(), None),
            // exit("message") - string as first argument (backward compatibility)
            (Some(val), None) if val.unpack_str().is_some() => {
                (0, Some(val.unpack_str().unwrap().to_string()))
            }
            // exit(3, "message") - both arguments
            (Some(val), Some(msg)) if val.unpack_i32().is_some() => {
                (val.unpack_i32().unwrap(), Some(msg))
            }
            // Invalid usage
            _ => {
                return Err(anyhow::anyhow!(
                    "exit() expects exit(code=0, msg=None) - code must be an integer"
                ))
            }
        };

        EXIT_FLAG.with(|flag| flag.set(true));
        EXIT_MESSAGE.with(|message| {
            *message.borrow_mut() = msg;
        });
        EXIT_CODE.with(|exit_code| {
            exit_code.set(code);
        });
        Ok(starlark::values::none::NoneType)
    }

    fn print(message: String) -> anyhow::Result<starlark::values::none::NoneType> {
        eprintln!("{}", message);
        Ok(starlark::values::none::NoneType)
    }

    // Text processing functions
    fn regex_match(pattern: String, text: String) -> anyhow::Result<bool> {
        match regex::Regex::new(&pattern) {
            Ok(regex) => Ok(regex.is_match(&text)),
            Err(_) => Ok(false),
        }
    }

    fn regex_replace(pattern: String, replacement: String, text: String) -> anyhow::Result<String> {
        let regex = regex::Regex::new(&pattern)?;
        Ok(regex.replace_all(&text, replacement.as_str()).into_owned())
    }

    fn regex_find_all<'v>(
        heap: &'v Heap,
        pattern: String,
        text: String,
    ) -> anyhow::Result<Value<'v>> {
        let regex = regex::Regex::new(&pattern)?;
        let matches: Vec<Value> = regex
            .find_iter(&text)
            .map(|m| heap.alloc(m.as_str().to_string()))
            .collect();
        Ok(heap.alloc(matches))
    }

    // Pattern extraction function
    fn extract_pattern<'v>(
        heap: &'v Heap,
        pattern_name: String,
        text: String,
    ) -> anyhow::Result<Value<'v>> {
        if let Some((pattern, _)) = BUILTIN_REGEXES.get(pattern_name.as_str()) {
            match Regex::new(pattern) {
                Ok(regex) => {
                    if let Some(m) = regex.find(&text) {
                        Ok(heap.alloc(m.as_str().to_string()))
                    } else {
                        Ok(Value::new_none())
                    }
                }
                Err(_) => Ok(Value::new_none()), // Invalid regex - return None
            }
        } else {
            Ok(Value::new_none()) // Pattern name not found
        }
    }

    // JSON functions
    fn parse_json<'v>(heap: &'v Heap, text: String) -> anyhow::Result<Value<'v>> {
        let json_value: serde_json::Value = serde_json::from_str(&text)?;
        json_to_starlark_value(heap, json_value)
    }

    fn dump_json(value: Value) -> anyhow::Result<String> {
        let json_value = starlark_to_json_value(value)?;
        Ok(serde_json::to_string(&json_value)?)
    }

    // CSV functions
    fn parse_csv<'v>(
        heap: &'v Heap,
        line: String,
        headers: Option<Value>,
        sep: Option<String>,
    ) -> anyhow::Result<Value<'v>> {
        use starlark::collections::SmallMap;
        use starlark::values::{dict::Dict, list::ListRef};

        let separator = sep.unwrap_or_else(|| ",".to_string());
        let sep_char = separator.chars().next().unwrap_or(',');

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(sep_char as u8)
            .has_headers(false)
            .from_reader(line.as_bytes());

        if let Some(record) = reader.records().next() {
            let record = record?;
            let fields: Vec<String> = record.iter().map(|field| field.to_string()).collect();

            // Handle headers
            let column_names = if let Some(headers_val) = headers {
                // Extract headers from list value
                if let Some(list) = ListRef::from_value(headers_val) {
                    list.iter()
                        .map(|v| {
                            // Extract the actual string content, not the debug representation
                            if let Some(s) = v.unpack_str() {
                                s.to_string()
                            } else {
                                v.to_string() // Fallback to debug representation
                            }
                        })
                        .collect::<Vec<String>>()
                } else {
                    return Err(anyhow::anyhow!("headers must be a list"));
                }
            } else {
                // Auto-generate col1, col2, col3...
                (1..=fields.len()).map(|i| format!("col{}", i)).collect()
            };

            // Create dict from headers and fields
            let mut dict_map = SmallMap::new();

            for (i, header) in column_names.iter().enumerate() {
                let value = if i < fields.len() {
                    fields[i].clone()
                } else {
                    // More headers than fields - fill with empty string
                    String::new()
                };

                // Allocate key and value as strings directly
                let key = heap.alloc(header.as_str()); // Use as_str() to avoid extra quotes
                let val = heap.alloc(value);
                dict_map.insert_hashed(key.get_hashed().unwrap(), val);
            }

            // Note: if there are more fields than headers, we ignore the extra fields

            let dict = Dict::new(dict_map);
            Ok(heap.alloc(dict))
        } else {
            // Empty line - return empty dict
            let dict = Dict::new(SmallMap::new());
            Ok(heap.alloc(dict))
        }
    }

    fn dump_csv(values: Value, delimiter: Option<String>) -> anyhow::Result<String> {
        use starlark::values::list::ListRef;

        let delim = delimiter.unwrap_or_else(|| ",".to_string());
        let delim_char = delim.chars().next().unwrap_or(',');

        let list = ListRef::from_value(values)
            .ok_or_else(|| anyhow::anyhow!("Expected list for dump_csv"))?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delim_char as u8)
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(Vec::new());

        let fields: Vec<String> = list
            .iter()
            .map(|v| {
                let s = v.to_string();
                if s.starts_with('"') && s.ends_with('"') && s.len() > 1 {
                    s[1..s.len() - 1].to_string()
                } else {
                    s
                }
            })
            .collect();

        writer.write_record(&fields)?;
        let data = writer.into_inner()?;
        let result = String::from_utf8(data)?;
        Ok(result.trim_end().to_string())
    }

    // Key-value parsing
    fn parse_kv<'v>(
        heap: &'v Heap,
        line: String,
        sep: Option<String>,
        delim: Option<String>,
    ) -> anyhow::Result<Value<'v>> {
        let separator = sep.unwrap_or_else(|| "=".to_string());
        let delimiter = delim.unwrap_or_else(|| " ".to_string());

        let mut items = Vec::new();
        for pair in line.split(&delimiter) {
            if let Some((key, value)) = pair.split_once(&separator) {
                let k = key.trim();
                let v = value.trim();
                items.push(format!("{}: {}", k, v));
            }
        }

        let dict_str = format!("{{{}}}", items.join(", "));
        Ok(heap.alloc(dict_str))
    }

    // Standard functions
    fn str<'v>(heap: &'v Heap, value: Value<'v>) -> anyhow::Result<Value<'v>> {
        Ok(heap.alloc(value.to_string()))
    }

    fn len<'v>(value: Value<'v>) -> anyhow::Result<i32> {
        use starlark::values::{dict::DictRef, list::ListRef};

        if let Some(s) = value.unpack_str() {
            Ok(s.len() as i32)
        } else if let Some(list) = ListRef::from_value(value) {
            Ok(list.len() as i32)
        } else if let Some(dict) = DictRef::from_value(value) {
            Ok(dict.len() as i32)
        } else {
            Err(anyhow::anyhow!(
                "object of type '{}' has no len()",
                value.get_type()
            ))
        }
    }

    // Timestamp functions
    fn parse_ts(text: String, format: Option<String>) -> anyhow::Result<i64> {
        if let Some(fmt) = format {
            // Parse with custom format
            let dt = NaiveDateTime::parse_from_str(&text, &fmt).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to parse timestamp '{}' with format '{}': {}",
                    text,
                    fmt,
                    e
                )
            })?;
            Ok(dt.and_utc().timestamp())
        } else {
            // Auto-detect common formats
            // Try RFC3339/ISO 8601 first
            if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
                return Ok(dt.timestamp());
            }

            // Try ISO 8601 without timezone (assume UTC)
            if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S") {
                return Ok(dt.and_utc().timestamp());
            }

            // Try common log format
            if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S") {
                return Ok(dt.and_utc().timestamp());
            }

            // Try date only
            if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d") {
                return Ok(dt.and_utc().timestamp());
            }

            Err(anyhow::anyhow!(
                "Failed to parse timestamp '{}' - unsupported format",
                text
            ))
        }
    }

    fn format_ts<'v>(
        heap: &'v Heap,
        timestamp: i64,
        format: Option<String>,
    ) -> anyhow::Result<Value<'v>> {
        let dt = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("Invalid timestamp: {}", timestamp))?;

        let formatted = if let Some(fmt) = format {
            dt.format(&fmt).to_string()
        } else {
            // Default to ISO 8601
            dt.to_rfc3339()
        };

        Ok(heap.alloc(formatted))
    }

    fn now() -> anyhow::Result<i64> {
        Ok(Utc::now().timestamp())
    }

    fn ts_diff(ts1: i64, ts2: i64) -> anyhow::Result<i64> {
        Ok(ts1 - ts2)
    }

    fn ts_add(timestamp: i64, seconds: i64) -> anyhow::Result<i64> {
        Ok(timestamp + seconds)
    }

    fn guess_ts(text: String) -> anyhow::Result<i64> {
        // Try dateparser first - handles most common formats automatically
        match dateparser::parse(&text) {
            Ok(dt) => Ok(dt.timestamp()),
            Err(_) => {
                // Fallback to our manual format attempts for edge cases
                // Try RFC3339/ISO 8601 first
                if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
                    return Ok(dt.timestamp());
                }

                // Try ISO 8601 without timezone (assume UTC)
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try common log format
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try date only
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try Apache/Nginx log format (e.g., "25/Dec/2021:10:24:56 +0000")
                if let Ok(dt) = DateTime::parse_from_str(&text, "%d/%b/%Y:%H:%M:%S %z") {
                    return Ok(dt.timestamp());
                }

                // Try syslog format (e.g., "Dec 25 10:24:56")
                // Note: This assumes current year since syslog doesn't include year
                let current_year = Utc::now().year();
                let text_with_year = format!("{} {}", current_year, text);
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text_with_year, "%Y %b %d %H:%M:%S")
                {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try compact format YYYYMMDDTHHMMSS (e.g., "20030925T104941")
                if text.len() == 15 && text.chars().nth(8) == Some('T') {
                    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y%m%dT%H%M%S") {
                        return Ok(dt.and_utc().timestamp());
                    }
                }

                // Try compact format YYYYMMDDHHMM (e.g., "199709020900")
                if text.len() == 12 && text.chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y%m%d%H%M") {
                        return Ok(dt.and_utc().timestamp());
                    }
                }

                // Try German format DD.MM.YYYY HH:MM:SS (e.g., "27.01.2025 14:30:45")
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%d.%m.%Y %H:%M:%S") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try German date only DD.MM.YYYY (e.g., "27.01.2025")
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%d.%m.%Y") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try BGL format YYYY-MM-DD-HH.MM.SS.ffffff (e.g., "2025-01-27-14.30.45.123456")
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d-%H.%M.%S.%f") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try DD-MM-YYYY format (e.g., "27-01-2025")
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%d-%m-%Y") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try DD-MM-YYYY HH:MM:SS format (e.g., "27-01-2025 14:30:45")
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%d-%m-%Y %H:%M:%S") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try Spark format YY/MM/DD HH:MM:SS (e.g., "25/01/27 14:30:45")
                if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%y/%m/%d %H:%M:%S") {
                    return Ok(dt.and_utc().timestamp());
                }

                // Try Apache bracket format [Day Mon DD HH:MM:SS YYYY] (e.g., "[Mon Jan 27 14:30:45 2025]")
                if text.starts_with('[') && text.ends_with(']') {
                    let inner = &text[1..text.len() - 1];
                    if let Ok(dt) = NaiveDateTime::parse_from_str(inner, "%a %b %d %H:%M:%S %Y") {
                        return Ok(dt.and_utc().timestamp());
                    }
                }

                // Try Zookeeper format with comma separator (e.g., "2025-01-27 14:30:45,123")
                if text.contains(',') {
                    let comma_replaced = text.replace(',', ".");
                    if let Ok(dt) =
                        NaiveDateTime::parse_from_str(&comma_replaced, "%Y-%m-%d %H:%M:%S.%f")
                    {
                        return Ok(dt.and_utc().timestamp());
                    }
                }

                // Try nanosecond precision handling (truncate to microseconds)
                // Handle formats like "2024-01-15T10:30:45.123456789Z" or "2024-01-15T10:30:45.123456789+01:00"
                if text.contains('.')
                    && (text.ends_with('Z') || text.contains('+') || text.contains('-'))
                {
                    // Find the fractional seconds part
                    if let Some(dot_pos) = text.rfind('.') {
                        let before_dot = &text[..dot_pos];
                        let after_dot = &text[dot_pos + 1..];

                        // Find where timezone info starts
                        let mut tz_start = after_dot.len();
                        for (i, c) in after_dot.chars().enumerate() {
                            if c == 'Z' || c == '+' || c == '-' {
                                tz_start = i;
                                break;
                            }
                        }

                        let fractional = &after_dot[..tz_start];
                        let tz_part = &after_dot[tz_start..];

                        // Truncate fractional seconds to 6 digits (microseconds)
                        let truncated_fractional = if fractional.len() > 6 {
                            &fractional[..6]
                        } else {
                            fractional
                        };

                        let reconstructed =
                            format!("{}.{}{}", before_dot, truncated_fractional, tz_part);

                        // Try parsing the reconstructed timestamp
                        if let Ok(dt) = DateTime::parse_from_rfc3339(&reconstructed) {
                            return Ok(dt.timestamp());
                        }

                        // Try without timezone (assume UTC)
                        if tz_part == "Z" || tz_part.is_empty() {
                            let utc_format = format!("{}.{}", before_dot, truncated_fractional);
                            if let Ok(dt) =
                                NaiveDateTime::parse_from_str(&utc_format, "%Y-%m-%dT%H:%M:%S.%f")
                            {
                                return Ok(dt.and_utc().timestamp());
                            }
                        }
                    }
                }

                Err(anyhow::anyhow!(
                    "Failed to parse timestamp '{}' - no recognized format",
                    text
                ))
            }
        }
    }

    // Window functions
    fn window_values<'v>(heap: &'v Heap, field_name: String) -> anyhow::Result<Value<'v>> {
        WINDOW_CONTEXT.with(|ctx| {
            if let Some(window_buffer) = ctx.borrow().as_ref() {
                let values: Vec<Value> = window_buffer
                    .iter()
                    .filter_map(|record| {
                        // Extract field from either line or structured data
                        match (&record.line, &record.data) {
                            // For text records, only support "line" field
                            (Some(line), None) if field_name == "line" => {
                                Some(heap.alloc(line.clone()))
                            }
                            // For structured records, extract named field
                            (None, Some(data)) => data
                                .get(&field_name)
                                .and_then(|v| v.as_str())
                                .map(|s| heap.alloc(s.to_string())),
                            _ => None,
                        }
                    })
                    .collect();
                Ok(heap.alloc(values))
            } else {
                Ok(heap.alloc(Vec::<Value>::new()))
            }
        })
    }

    fn window_numbers<'v>(heap: &'v Heap, field_name: String) -> anyhow::Result<Value<'v>> {
        WINDOW_CONTEXT.with(|ctx| {
            if let Some(window_buffer) = ctx.borrow().as_ref() {
                let values: Vec<Value> = window_buffer
                    .iter()
                    .filter_map(|record| {
                        match (&record.line, &record.data) {
                            // For structured records, extract and convert to number
                            (None, Some(data)) => data
                                .get(&field_name)
                                .and_then(|v| v.as_f64())
                                .map(|f| heap.alloc(f)),
                            // For text records, try to parse as number
                            (Some(line), None) if field_name == "line" => {
                                line.parse::<f64>().ok().map(|f| heap.alloc(f))
                            }
                            _ => None,
                        }
                    })
                    .collect();
                Ok(heap.alloc(values))
            } else {
                Ok(heap.alloc(Vec::<Value>::new()))
            }
        })
    }

    fn window_size() -> anyhow::Result<i32> {
        WINDOW_CONTEXT.with(|ctx| {
            if let Some(window_buffer) = ctx.borrow().as_ref() {
                Ok(window_buffer.len() as i32)
            } else {
                Ok(0)
            }
        })
    }

    // Column extraction function - klp-compatible cols()
    fn cols<'v>(
        heap: &'v Heap,
        text: String,
        #[starlark(args)] args: UnpackTuple<Value<'v>>,
        sep: Option<String>,
        outsep: Option<String>,
    ) -> anyhow::Result<Value<'v>> {
        let separator = sep.as_deref().unwrap_or_default(); // Empty string = whitespace split
        let output_sep = outsep.as_deref().unwrap_or(" ");
        
        // Split input text
        let columns: Vec<String> = if separator.is_empty() {
            text.split_whitespace().map(|s| s.to_string()).collect()
        } else {
            text.split(separator).map(|s| s.to_string()).collect()
        };
        
        // Parse column specs from arguments
        let mut results = Vec::new();
        for arg in args.items {
            let spec_str = if let Some(s) = arg.unpack_str() {
                s.to_string()
            } else if let Some(i) = arg.unpack_i32() {
                i.to_string()
            } else {
                return Err(anyhow::anyhow!("Column spec must be string or integer"));
            };
            
            let spec = parse_column_spec(&spec_str)?;
            let result = extract_columns(&columns, &spec, output_sep);
            results.push(result);
        }
        
        // Return single value or list
        if results.len() == 1 {
            Ok(heap.alloc(results.into_iter().next().unwrap()))
        } else {
            let starlark_list: Vec<Value> = results.into_iter()
                .map(|s| heap.alloc(s))
                .collect();
            Ok(heap.alloc(starlark_list))
        }
    }
}

// Helper functions for JSON conversion
fn json_to_starlark_value(heap: &Heap, json: serde_json::Value) -> anyhow::Result<Value<'_>> {
    match json {
        serde_json::Value::Null => Ok(Value::new_none()),
        serde_json::Value::Bool(b) => Ok(Value::new_bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(heap.alloc(i as i32))
            } else if let Some(f) = n.as_f64() {
                Ok(heap.alloc(f))
            } else {
                Ok(heap.alloc(n.to_string()))
            }
        }
        serde_json::Value::String(s) => Ok(heap.alloc(s)),
        serde_json::Value::Array(arr) => {
            let values: Result<Vec<Value>, _> = arr
                .into_iter()
                .map(|v| json_to_starlark_value(heap, v))
                .collect();
            Ok(heap.alloc(values?))
        }
        serde_json::Value::Object(obj) => {
            use starlark::collections::SmallMap;
            use starlark::values::dict::Dict;

            let mut dict_map = SmallMap::new();
            for (k, v) in obj {
                let key = heap.alloc(k.as_str());
                let val = json_to_starlark_value(heap, v)?;
                dict_map.insert_hashed(key.get_hashed().unwrap(), val);
            }
            let dict = Dict::new(dict_map);
            Ok(heap.alloc(dict))
        }
    }
}

fn starlark_to_json_value(value: Value) -> anyhow::Result<serde_json::Value> {
    use starlark::values::{dict::DictRef, list::ListRef};

    if value.is_none() {
        Ok(serde_json::Value::Null)
    } else if let Some(b) = value.unpack_bool() {
        Ok(serde_json::Value::Bool(b))
    } else if let Some(i) = value.unpack_i32() {
        Ok(serde_json::Value::Number(serde_json::Number::from(i)))
    } else if let Some(s) = value.unpack_str() {
        Ok(serde_json::Value::String(s.to_string()))
    } else if let Some(list) = ListRef::from_value(value) {
        let arr: Result<Vec<serde_json::Value>, _> =
            list.iter().map(starlark_to_json_value).collect();
        Ok(serde_json::Value::Array(arr?))
    } else if let Some(dict) = DictRef::from_value(value) {
        let mut obj = serde_json::Map::new();
        for (k, v) in dict.iter() {
            let key = if let Some(s) = k.unpack_str() {
                s.to_string()
            } else {
                k.to_string()
            };
            obj.insert(key, starlark_to_json_value(v)?);
        }
        Ok(serde_json::Value::Object(obj))
    } else {
        Ok(serde_json::Value::String(value.to_string()))
    }
}

// Column specification parsing and extraction for cols() function
#[derive(Debug, PartialEq)]
enum ColumnSpec {
    Index(i32),                    // 0, 1, -1, -2
    MultiIndex(Vec<i32>),          // "0,2,4"
    Slice(Option<i32>, Option<i32>), // "1:3", "2:", ":5"
}

fn parse_column_spec(spec: &str) -> anyhow::Result<ColumnSpec> {
    if spec.contains(':') {
        // Slice notation: "1:3", "2:", ":5"
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() > 2 {
            return Err(anyhow::anyhow!("Invalid slice format: {}", spec));
        }
        
        let start = if parts[0].is_empty() { 
            None 
        } else { 
            Some(parts[0].parse::<i32>()?) 
        };
        
        let end = if parts.len() > 1 && !parts[1].is_empty() { 
            Some(parts[1].parse::<i32>()?) 
        } else { 
            None 
        };
        
        Ok(ColumnSpec::Slice(start, end))
    } else if spec.contains(',') {
        // Multiple indices: "0,2,4"
        let indices: Result<Vec<i32>, _> = spec
            .split(',')
            .map(|s| s.trim().parse::<i32>())
            .collect();
        Ok(ColumnSpec::MultiIndex(indices?))
    } else {
        // Single index: "0", "-1"
        Ok(ColumnSpec::Index(spec.parse::<i32>()?))
    }
}

fn extract_columns(columns: &[String], spec: &ColumnSpec, outsep: &str) -> String {
    match spec {
        ColumnSpec::Index(idx) => {
            let index = if *idx < 0 { 
                columns.len() as i32 + idx 
            } else { 
                *idx 
            };
            
            if index >= 0 && (index as usize) < columns.len() {
                columns[index as usize].clone()
            } else {
                String::new() // Out of bounds returns empty string
            }
        },
        ColumnSpec::MultiIndex(indices) => {
            indices.iter()
                .filter_map(|&idx| {
                    let index = if idx < 0 { 
                        columns.len() as i32 + idx 
                    } else { 
                        idx 
                    };
                    
                    if index >= 0 && (index as usize) < columns.len() {
                        Some(columns[index as usize].clone())
                    } else {
                        None // Skip out of bounds indices
                    }
                })
                .collect::<Vec<_>>()
                .join(outsep)
        },
        ColumnSpec::Slice(start, end) => {
            let len = columns.len() as i32;
            
            // Handle negative indices and defaults
            let start_idx = match start {
                Some(s) if *s < 0 => (len + s).max(0) as usize,
                Some(s) => (*s).max(0) as usize,
                None => 0,
            };
            
            let end_idx = match end {
                Some(e) if *e < 0 => (len + e).max(0) as usize,
                Some(e) => (*e).min(len) as usize,
                None => len as usize,
            };
            
            if start_idx < columns.len() && start_idx < end_idx {
                columns[start_idx..end_idx.min(columns.len())]
                    .join(outsep)
            } else {
                String::new()
            }
        }
    }
}


// Additional globals for derive mode with stelp_ prefix
#[starlark_module]
pub(crate) fn derive_globals_with_prefix(builder: &mut starlark::environment::GlobalsBuilder) {
    fn stelp_emit(text: String) -> anyhow::Result<starlark::values::none::NoneType> {
        EMIT_BUFFER.with(|buffer| {
            buffer.borrow_mut().push(text);
        });
        Ok(starlark::values::none::NoneType)
    }

    fn stelp_skip() -> anyhow::Result<starlark::values::none::NoneType> {
        SKIP_FLAG.with(|flag| flag.set(true));
        Ok(starlark::values::none::NoneType)
    }

    fn stelp_exit<'v>(
        arg1: Option<starlark::values::Value<'v>>,
        arg2: Option<String>,
    ) -> anyhow::Result<starlark::values::none::NoneType> {
        let (code, msg) = match (arg1, arg2) {
            // stelp_exit() - no arguments
            (None, None) => (0, None),
            // stelp_exit(3) - integer as first argument
            (Some(val), None) if val.unpack_i32().is_some() => (val.unpack_i32().unwrap(), None),
            // stelp_exit("message") - string as first argument (backward compatibility)
            (Some(val), None) if val.unpack_str().is_some() => {
                (0, Some(val.unpack_str().unwrap().to_string()))
            }
            // stelp_exit(3, "message") - both arguments
            (Some(val), Some(msg)) if val.unpack_i32().is_some() => {
                (val.unpack_i32().unwrap(), Some(msg))
            }
            // Invalid usage
            _ => {
                return Err(anyhow::anyhow!(
                    "stelp_exit() expects stelp_exit(code=0, msg=None) - code must be an integer"
                ))
            }
        };

        EXIT_FLAG.with(|flag| flag.set(true));
        EXIT_MESSAGE.with(|message| {
            *message.borrow_mut() = msg;
        });
        EXIT_CODE.with(|exit_code| {
            exit_code.set(code);
        });
        Ok(starlark::values::none::NoneType)
    }

    fn stelp_inc(counter_name: String) -> anyhow::Result<i32> {
        CURRENT_CONTEXT.with(|ctx_cell| {
            if let Some((global_vars_ptr, _, _)) = *ctx_cell.borrow() {
                unsafe {
                    let global_vars = &*global_vars_ptr;
                    Ok(global_vars.increment_counter(&counter_name))
                }
            } else {
                Err(anyhow::anyhow!("No processing context available"))
            }
        })
    }
}
