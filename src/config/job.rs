//! Stream request parsing
//!
//! Command line form: `PATH[,key=value...]`, e.g. `voice.wav,stream=0,offset=-2.5`.
//! Job file form: one request per line, the path first (double-quoted when it
//! contains spaces) then whitespace separated `key=value` fields. Lines starting
//! with `#` and blank lines are ignored.
//!
//! Keys: `stream`, `channel`, `profile`, `offset`, `slot`. Missing keys default
//! to stream 0, passthrough, no offset.

use std::path::Path;
use tracing::debug;

use crate::domain::StreamRequest;
use crate::error::{ShiftXError, ShiftXResult};
use crate::utils::time::parse_offset;

const KEYS: &[&str] = &["stream", "channel", "profile", "offset", "slot"];

/// Parse one command line request
pub fn parse_request(text: &str) -> ShiftXResult<StreamRequest> {
    let segments: Vec<&str> = text.split(',').collect();

    // Trailing `key=value` segments are options, the rest is the path, which may hold commas
    let mut path_end = segments.len();
    while path_end > 1 && is_field(segments[path_end - 1]) {
        path_end -= 1;
    }
    let path = segments[..path_end].join(",");
    if path.trim().is_empty() {
        return Err(ShiftXError::config(format!("Missing input path in '{}'", text)));
    }

    let mut request = StreamRequest::new(path);
    for field in &segments[path_end..] {
        apply_field(&mut request, field)?;
    }
    Ok(request)
}

/// Parse the content of a job file
pub fn parse_job_text(content: &str) -> ShiftXResult<Vec<StreamRequest>> {
    let mut requests = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let request = parse_line(line)
            .map_err(|e| ShiftXError::config(format!("line {}: {}", number + 1, message_of(e))))?;
        requests.push(request);
    }
    Ok(requests)
}

/// Read and parse a job file
///
/// Relative input paths are resolved against the job file's directory.
pub fn parse_job_file(path: &Path) -> ShiftXResult<Vec<StreamRequest>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ShiftXError::config(format!("Cannot read job file {}: {}", path.display(), e)))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let requests = parse_job_text(&content)
        .map_err(|e| ShiftXError::config(format!("{}: {}", path.display(), message_of(e))))?
        .into_iter()
        .map(|mut request| {
            if request.path.is_relative() {
                request.path = base.join(&request.path);
            }
            request
        })
        .collect::<Vec<_>>();

    debug!("Job file {} lists {} stream(s)", path.display(), requests.len());
    Ok(requests)
}

fn parse_line(line: &str) -> ShiftXResult<StreamRequest> {
    let tokens = tokenize(line)?;
    let (path, fields) = tokens
        .split_first()
        .ok_or_else(|| ShiftXError::config("empty request"))?;

    let mut request = StreamRequest::new(path.as_str());
    for field in fields {
        apply_field(&mut request, field)?;
    }
    Ok(request)
}

/// Split on whitespace, keeping double-quoted runs together
fn tokenize(line: &str) -> ShiftXResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if quoted {
        return Err(ShiftXError::config("unterminated quote"));
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

fn is_field(segment: &str) -> bool {
    segment
        .split_once('=')
        .map_or(false, |(key, _)| KEYS.contains(&key.trim()))
}

fn apply_field(request: &mut StreamRequest, field: &str) -> ShiftXResult<()> {
    let (key, value) = field
        .split_once('=')
        .ok_or_else(|| ShiftXError::config(format!("expected key=value, found '{}'", field)))?;
    let value = value.trim();

    let index = |what: &str| {
        value
            .parse::<usize>()
            .map_err(|_| ShiftXError::config(format!("invalid {} '{}'", what, value)))
    };

    match key.trim() {
        "stream" => request.stream_index = index("stream index")?,
        "channel" => request.channel = Some(index("channel")?),
        "slot" => request.slot = Some(index("slot")?),
        "profile" => {
            request.profile = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }
        "offset" => request.offset = parse_offset(value)?,
        other => {
            return Err(ShiftXError::config(format!(
                "unknown key '{}' (expected one of {})",
                other,
                KEYS.join(", ")
            )))
        }
    }
    Ok(())
}

fn message_of(error: ShiftXError) -> String {
    match error {
        ShiftXError::ConfigError { message } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_request_defaults() {
        let request = parse_request("a.wav").unwrap();
        assert_eq!(request, StreamRequest::new("a.wav"));
    }

    #[test]
    fn test_parse_request_fields() {
        let request =
            parse_request("dir/in.mov,stream=2,profile=wave24b48kmono,offset=-5.5,channel=1,slot=3")
                .unwrap();
        assert_eq!(request.path, PathBuf::from("dir/in.mov"));
        assert_eq!(request.stream_index, 2);
        assert_eq!(request.profile.as_deref(), Some("wave24b48kmono"));
        assert_eq!(request.offset, -5.5);
        assert_eq!(request.channel, Some(1));
        assert_eq!(request.slot, Some(3));
    }

    #[test]
    fn test_parse_request_path_with_comma() {
        let request = parse_request("take 1,2.wav,offset=00:01.5").unwrap();
        assert_eq!(request.path, PathBuf::from("take 1,2.wav"));
        assert_eq!(request.offset, 1.5);
    }

    #[test]
    fn test_parse_request_empty_profile_is_passthrough() {
        let request = parse_request("a.wav,profile=").unwrap();
        assert!(request.profile.is_none());
    }

    #[test]
    fn test_parse_request_errors() {
        assert!(parse_request("a.wav,stream=x").is_err());
        assert!(parse_request("a.wav,offset=soon").is_err());
        assert!(parse_request(",offset=1").is_err());
    }

    #[test]
    fn test_parse_job_text() {
        let content = r#"
# music bed, shifted ten seconds
music.wav offset=10

"voice over.wav" stream=0 profile=wave16b48kmono offset=-2
clip.mov stream=1 slot=0
"#;
        let requests = parse_job_text(content).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].path, PathBuf::from("music.wav"));
        assert_eq!(requests[0].offset, 10.0);
        assert_eq!(requests[1].path, PathBuf::from("voice over.wav"));
        assert_eq!(requests[1].profile.as_deref(), Some("wave16b48kmono"));
        assert_eq!(requests[1].offset, -2.0);
        assert_eq!(requests[2].stream_index, 1);
        assert_eq!(requests[2].slot, Some(0));
    }

    #[test]
    fn test_parse_job_text_reports_line() {
        let err = parse_job_text("a.wav\nb.wav colour=red\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
        assert!(err.to_string().contains("colour"), "{}", err);

        assert!(parse_job_text("\"open.wav offset=1").is_err());
    }

    #[test]
    fn test_parse_job_file_resolves_relative_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let job = dir.path().join("job.txt");
        std::fs::write(&job, "a.wav\n/abs/b.wav offset=1\n").unwrap();

        let requests = parse_job_file(&job).unwrap();
        assert_eq!(requests[0].path, dir.path().join("a.wav"));
        assert_eq!(requests[1].path, PathBuf::from("/abs/b.wav"));
    }
}
