//! Recover metadata from raw extraction-tool output
//!
//! yt-dlp mixes free-form progress lines with (when asked) a JSON metadata
//! line. Nothing here fails: unmatched input yields `None`, and
//! [`parse_output`] substitutes a timestamped fallback title.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Metadata recovered from a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub title: String,
    /// Whether `title` came from the output rather than the fallback
    pub title_found: bool,
    pub duration_secs: Option<u64>,
    pub file_path: Option<PathBuf>,
}

/// A single `[download]  42.0% ... ETA 00:10` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressLine {
    pub percent: f32,
    pub eta_secs: Option<u64>,
}

struct Patterns {
    /// Non-JSON title sources, in order; each capture is a file path
    file_titles: Vec<Regex>,
    generic_title: Regex,
    fallback_title: Regex,
    file_paths: Vec<Regex>,
    progress: Regex,
    eta: Regex,
    disallowed: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static pattern");
        let destination = r"(?m)^\[download\] Destination: (.+?)\s*$";
        let already = r"(?m)^\[download\] (.+?) has already been downloaded";
        let merger = r#"(?m)^\[Merger\] Merging formats into "(.+?)"\s*$"#;
        Patterns {
            file_titles: vec![re(destination), re(already), re(merger)],
            generic_title: re(r"(?m)^Downloading: (.+?)\s*$"),
            fallback_title: re(r#"(?im)title["']?\s*[:=]?[^"'\n]*?["']([^"'\n]+)["']"#),
            file_paths: vec![re(merger), re(already), re(destination)],
            progress: re(r"\[download\]\s+(\d+(?:\.\d+)?)%"),
            eta: re(r"ETA\s+(?:(\d+):)?(\d+):(\d+)"),
            disallowed: re(r"[^\p{L}\p{N}\s\-_.()]"),
        }
    })
}

/// The last `--print-json` metadata object in the output.
fn metadata(output: &str) -> Option<Value> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<Value>(line).ok().filter(Value::is_object))
}

fn json_str<'a>(meta: Option<&'a Value>, key: &str) -> Option<&'a str> {
    meta.and_then(|m| m.get(key)).and_then(Value::as_str)
}

/// Extract a title; first non-empty source wins.
///
/// Order: `title` and `fulltitle` of the metadata line, the file name of a
/// destination/already-downloaded/merge line, a `Downloading:` line, then
/// any quoted value following the word `title`.
pub fn extract_title(output: &str) -> Option<String> {
    let p = patterns();
    let meta = metadata(output);

    let from_json = ["title", "fulltitle"]
        .iter()
        .filter_map(|key| json_str(meta.as_ref(), key))
        .map(|text| sanitize(&text.replace(['\n', '\r', '\t'], " ")));
    let from_files = p
        .file_titles
        .iter()
        .filter_map(|pattern| pattern.captures(output).and_then(|c| c.get(1)))
        .map(|m| sanitize(&file_stem(m.as_str())));
    let from_generic = p
        .generic_title
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| sanitize(m.as_str()));
    let from_fallback = p
        .fallback_title
        .captures_iter(output)
        .filter_map(|c| c.get(1))
        .map(|m| sanitize(m.as_str()));

    let title = from_json
        .chain(from_files)
        .chain(from_generic)
        .chain(from_fallback)
        .find(|t| !t.is_empty());
    if let Some(title) = &title {
        debug!("Extracted title: {}", title);
    }
    title
}

/// Duration in whole seconds from the metadata line's `duration`.
pub fn extract_duration(output: &str) -> Option<u64> {
    metadata(output)?
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|secs| *secs >= 0.0)
        .map(|secs| secs as u64)
}

/// Path of the produced file.
///
/// The metadata line is authoritative; otherwise the last merge/destination
/// line is used since later lines name the final (merged) file.
pub fn extract_file_path(output: &str) -> Option<PathBuf> {
    let meta = metadata(output);
    if let Some(path) = ["_filename", "filename"]
        .iter()
        .filter_map(|key| json_str(meta.as_ref(), key))
        .map(str::trim)
        .find(|path| !path.is_empty())
    {
        return Some(PathBuf::from(path));
    }

    patterns().file_paths.iter().find_map(|pattern| {
        pattern
            .captures_iter(output)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    })
}

/// Parse a whole run. Never fails; the title falls back to `Video_<millis>`.
pub fn parse_output(output: &str, now: DateTime<Utc>) -> ParsedOutput {
    let found = extract_title(output);
    ParsedOutput {
        title_found: found.is_some(),
        title: found.unwrap_or_else(|| fallback_title(now)),
        duration_secs: extract_duration(output),
        file_path: extract_file_path(output),
    }
}

pub fn fallback_title(now: DateTime<Utc>) -> String {
    format!("Video_{}", now.timestamp_millis())
}

/// Parse a yt-dlp progress line.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let p = patterns();
    let percent = p.progress.captures(line)?[1].parse::<f32>().ok()?;
    let eta_secs = p.eta.captures(line).map(|c| {
        let hours = c.get(1).and_then(|m| m.as_str().parse::<u64>().ok()).unwrap_or(0);
        let minutes = c[2].parse::<u64>().unwrap_or(0);
        let seconds = c[3].parse::<u64>().unwrap_or(0);
        hours * 3600 + minutes * 60 + seconds
    });
    Some(ProgressLine {
        percent: percent.clamp(0.0, 100.0),
        eta_secs,
    })
}

fn file_stem(path: &str) -> String {
    Path::new(path.trim())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sanitize(s: &str) -> String {
    patterns().disallowed.replace_all(s, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_title_field() {
        assert_eq!(extract_title(r#"{"id": "x", "title": "Foo"}"#).as_deref(), Some("Foo"));
    }

    #[test]
    fn test_title_field_wins_over_destination() {
        let out = "[download] Destination: /tmp/Other Name.mp4\n{\"title\": \"Real Title\"}";
        assert_eq!(extract_title(out).as_deref(), Some("Real Title"));
    }

    #[test]
    fn test_escaped_quotes_are_decoded_then_sanitized() {
        let out = r#"{"title": "Say \"hi\"\nnow"}"#;
        assert_eq!(extract_title(out).as_deref(), Some("Say hi now"));
    }

    #[test]
    fn test_fulltitle_used_when_title_missing() {
        let out = r#"{"fulltitle": "Full One"}"#;
        assert_eq!(extract_title(out).as_deref(), Some("Full One"));
    }

    #[test]
    fn test_destination_file_stem() {
        let out = "[youtube] abc: Downloading webpage\n[download] Destination: /videos/My Clip (HD).mp4\n[download]  10.0% of 5MiB";
        assert_eq!(extract_title(out).as_deref(), Some("My Clip (HD)"));
    }

    #[test]
    fn test_already_downloaded_file_stem() {
        let out = "[download] /videos/Old Clip.webm has already been downloaded";
        assert_eq!(extract_title(out).as_deref(), Some("Old Clip"));
    }

    #[test]
    fn test_generic_fallback_line() {
        let out = "something\nvideo title is 'Loose Match'\n";
        assert_eq!(extract_title(out).as_deref(), Some("Loose Match"));
    }

    #[test]
    fn test_sanitize_strips_symbols_keeps_letters() {
        assert_eq!(extract_title(r#"{"title": "Café — Live! #1"}"#).as_deref(), Some("Café  Live 1"));
    }

    #[test]
    fn test_no_match_is_none() {
        assert_eq!(extract_title("[info] nothing useful here"), None);
        assert_eq!(extract_title(""), None);
    }

    #[test]
    fn test_symbol_only_title_falls_through() {
        let out = "{\"title\": \"!!!\"}\n[download] Destination: /v/Second.mp4";
        assert_eq!(extract_title(out).as_deref(), Some("Second"));
    }

    #[test]
    fn test_parse_output_fallback_contains_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let parsed = parse_output("no metadata", now);
        assert!(!parsed.title_found);
        assert_eq!(parsed.title, format!("Video_{}", now.timestamp_millis()));
        assert!(parsed.title.contains(&now.timestamp_millis().to_string()));
        assert_eq!(parsed.duration_secs, None);
        assert_eq!(parsed.file_path, None);
    }

    #[test]
    fn test_duration() {
        assert_eq!(extract_duration(r#"{"duration": 212}"#), Some(212));
        assert_eq!(extract_duration(r#"{"duration": 61.9}"#), Some(61));
        assert_eq!(extract_duration(r#"{"duration": null}"#), None);
        assert_eq!(extract_duration("[download] 100%"), None);
    }

    #[test]
    fn test_unicode_escapes_in_metadata_are_decoded() {
        let out = "[download] Destination: /v/Caf\u{e9} Live.f137.mp4\n\
                   {\"title\": \"Caf\\u00e9 Live\", \"_filename\": \"/v/Caf\\u00e9 Live.mp4\", \"duration\": 5}";
        assert_eq!(extract_title(out).as_deref(), Some("Caf\u{e9} Live"));
        assert_eq!(extract_file_path(out), Some(PathBuf::from("/v/Caf\u{e9} Live.mp4")));
        assert_eq!(extract_duration(out), Some(5));
    }

    #[test]
    fn test_fallback_takes_value_after_title_key() {
        assert_eq!(extract_title(r#"{"title": "!!!", "uploader": "Bob"}"#), None);
        assert_eq!(extract_title("Title = 'Named'; uploader = 'Bob'").as_deref(), Some("Named"));
    }

    #[test]
    fn test_malformed_json_line_falls_back_to_patterns() {
        let out = "{\"title\": \"cut off\n[download] Destination: /v/Recovered.mp4";
        assert_eq!(extract_title(out).as_deref(), Some("Recovered"));
        assert_eq!(extract_file_path(out), Some(PathBuf::from("/v/Recovered.mp4")));
    }

    #[test]
    fn test_file_path_prefers_json() {
        let out = "[download] Destination: /v/a.f137.mp4\n{\"title\": \"a\", \"_filename\": \"/v/a.mp4\"}";
        assert_eq!(extract_file_path(out), Some(PathBuf::from("/v/a.mp4")));
    }

    #[test]
    fn test_file_path_uses_merger_line() {
        let out = "[download] Destination: /v/a.f137.mp4\n[download] Destination: /v/a.f140.m4a\n[Merger] Merging formats into \"/v/a.mp4\"";
        assert_eq!(extract_file_path(out), Some(PathBuf::from("/v/a.mp4")));
    }

    #[test]
    fn test_file_path_last_destination() {
        let out = "[download] Destination: /v/first.mp4\n[download] Destination: /v/second.mp4";
        assert_eq!(extract_file_path(out), Some(PathBuf::from("/v/second.mp4")));
    }

    #[test]
    fn test_progress_line() {
        let line = "[download]  42.5% of 10.00MiB at  1.00MiB/s ETA 00:05";
        let p = parse_progress_line(line).unwrap();
        assert_eq!(p.percent, 42.5);
        assert_eq!(p.eta_secs, Some(5));

        let p = parse_progress_line("[download]   3.0% of ~1.00GiB at 2MiB/s ETA 1:02:03").unwrap();
        assert_eq!(p.eta_secs, Some(3723));

        let p = parse_progress_line("[download] 100% of 10.00MiB in 00:03").unwrap();
        assert_eq!(p.percent, 100.0);
        assert_eq!(p.eta_secs, None);

        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
    }
}
