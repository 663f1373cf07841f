//! Claude Code history storage format handling.
//!
//! This module contains all code that knows about Claude Code's specific
//! file formats and directory layout. If Claude Code changes its storage
//! format, changes should be isolated to this module.
//!
//! ## Storage Structure
//!
//! ```text
//! ~/.claude/
//!   history.jsonl            # Flat prompt log, one JSON entry per line
//!   projects/
//!     -Users-you-project-a/  # Encoded project path (see path_decode)
//!       abc123.jsonl         # Session transcript
//!       def456.jsonl
//!     -Users-you-project-b/
//!       ghi789.jsonl
//! ```

use crate::config::ClaudeDirs;
use crate::path_decode::{self, FsProbe};
use anyhow::{Context, Result};
use memchr::memmem;
use rayon::prelude::*;
use serde::Deserialize;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// =============================================================================
// Browsing Model
// =============================================================================

/// One encoded project directory under ~/.claude/projects
#[derive(Debug)]
pub struct Project {
    pub encoded: String,
    /// Original filesystem path reconstructed by the decoder
    pub decoded: String,
    pub session_count: usize,
}

/// One session transcript file
#[derive(Debug)]
pub struct SessionEntry {
    pub id: String,
    pub project_encoded: String,
    pub project_decoded: String,
    pub filepath: PathBuf,
    pub modified: SystemTime,
    pub size_kb: u64,
    /// First real user prompt, normalized for one-line display
    pub preview: Option<String>,
}

// =============================================================================
// Transcript Schema
// =============================================================================

/// One line of a session transcript.
///
/// Only the fields display needs; everything else in the line is ignored.
#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<MessageBody>,
    /// Present on `type: "summary"` lines from compacted sessions
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    /// Either a plain string or an array of content blocks
    #[serde(default)]
    pub content: serde_json::Value,
}

impl Message {
    /// Text payload: the string content, or the first text block.
    pub fn text(&self) -> Option<String> {
        let content = &self.message.as_ref()?.content;
        if let Some(s) = content.as_str() {
            return Some(s.to_string());
        }
        content.as_array()?.iter().find_map(|block| {
            if block.get("type")?.as_str()? == "text" {
                Some(block.get("text")?.as_str()?.to_string())
            } else {
                None
            }
        })
    }

    /// Names of tool_use blocks in this message, in order.
    pub fn tool_names(&self) -> Vec<String> {
        let Some(body) = &self.message else {
            return Vec::new();
        };
        body.content
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
                    .filter_map(|b| b.get("name")?.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Check if user text is tool/system plumbing rather than a typed prompt
pub fn is_system_text(text: &str) -> bool {
    text.starts_with('/') || text.starts_with('<') || text.starts_with('[')
}

// =============================================================================
// Prompt Log Schema
// =============================================================================

/// One line of ~/.claude/history.jsonl
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub display: String,
    /// Milliseconds since epoch
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub project_path: Option<String>,
}

// =============================================================================
// Project Listing
// =============================================================================

/// List encoded project directories with decoded paths and session counts,
/// sorted by decoded path. A missing projects directory is an empty list,
/// not an error.
pub fn list_projects(dirs: &ClaudeDirs) -> Result<Vec<Project>> {
    if !dirs.projects.exists() {
        return Ok(Vec::new());
    }

    let entries: Vec<(String, PathBuf)> = fs::read_dir(&dirs.projects)
        .with_context(|| format!("Failed to read {}", dirs.projects.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| (e.file_name().to_string_lossy().to_string(), e.path()))
        .collect();

    // Each decode probes the filesystem repeatedly; do them in parallel
    let mut projects: Vec<Project> = entries
        .par_iter()
        .map(|(encoded, dir)| Project {
            encoded: encoded.clone(),
            decoded: path_decode::decode_path(encoded, &FsProbe),
            session_count: count_transcripts(dir),
        })
        .collect();

    projects.sort_by(|a, b| a.decoded.cmp(&b.decoded));
    Ok(projects)
}

fn count_transcripts(project_dir: &Path) -> usize {
    fs::read_dir(project_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
                .count()
        })
        .unwrap_or(0)
}

// =============================================================================
// Session Listing
// =============================================================================

/// Sessions across every project, newest first.
pub fn all_sessions(dirs: &ClaudeDirs) -> Result<Vec<SessionEntry>> {
    if !dirs.projects.exists() {
        return Ok(Vec::new());
    }

    let transcript_files: Vec<PathBuf> = WalkDir::new(&dirs.projects)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
        .map(|e| e.path().to_path_buf())
        .collect();

    let mut sessions: Vec<SessionEntry> = transcript_files
        .par_iter()
        .filter_map(|path| session_from_file(path))
        .collect();

    sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(sessions)
}

/// Sessions in one encoded project directory, newest first. A missing
/// directory is an empty list.
pub fn list_sessions(dirs: &ClaudeDirs, encoded: &str) -> Result<Vec<SessionEntry>> {
    let project_dir = dirs.projects.join(encoded);
    if !project_dir.exists() {
        return Ok(Vec::new());
    }

    let transcript_files: Vec<PathBuf> = fs::read_dir(&project_dir)
        .with_context(|| format!("Failed to read {}", project_dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
        .map(|e| e.path())
        .collect();

    let mut sessions: Vec<SessionEntry> = transcript_files
        .par_iter()
        .filter_map(|path| session_from_file(path))
        .collect();

    sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(sessions)
}

/// Build a SessionEntry from a transcript file path.
///
/// Subagent transcripts (agent-*.jsonl) are skipped; they belong to the
/// parent session.
fn session_from_file(filepath: &Path) -> Option<SessionEntry> {
    let id = filepath.file_stem()?.to_string_lossy().to_string();
    if id.starts_with("agent-") {
        return None;
    }

    let project_encoded = filepath.parent()?.file_name()?.to_string_lossy().to_string();
    let metadata = fs::metadata(filepath).ok()?;
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);

    Some(SessionEntry {
        id,
        project_decoded: path_decode::decode_path(&project_encoded, &FsProbe),
        project_encoded,
        filepath: filepath.to_path_buf(),
        modified,
        size_kb: metadata.len() / 1024,
        preview: extract_preview(filepath),
    })
}

/// First real user prompt in a transcript, normalized for display.
///
/// Scans only the head of the file; long sessions whose opening messages
/// are all system plumbing just get no preview.
fn extract_preview(filepath: &Path) -> Option<String> {
    const SCAN_LINES: usize = 50;

    let file = fs::File::open(filepath).ok()?;
    let reader = BufReader::new(file);

    for line in reader.lines().take(SCAN_LINES).map_while(Result::ok) {
        let Ok(msg) = serde_json::from_str::<Message>(&line) else {
            continue;
        };
        if msg.kind != "user" {
            continue;
        }
        if let Some(text) = msg.text() {
            if !is_system_text(&text) {
                return Some(normalize_preview(&text, 80));
            }
        }
    }
    None
}

/// Collapse whitespace and truncate at a char boundary for one-line display
pub fn normalize_preview(text: &str, max_chars: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

// =============================================================================
// Session Lookup & Reading
// =============================================================================

/// Find a session transcript by id: exact `<id>.jsonl` match in any project
/// first, then the first transcript whose id starts with `id`.
pub fn find_session(dirs: &ClaudeDirs, id: &str) -> Result<Option<PathBuf>> {
    if !dirs.projects.exists() {
        return Ok(None);
    }

    let project_dirs: Vec<PathBuf> = fs::read_dir(&dirs.projects)
        .with_context(|| format!("Failed to read {}", dirs.projects.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.path())
        .collect();

    for dir in &project_dirs {
        let exact = dir.join(format!("{}.jsonl", id));
        if exact.exists() {
            return Ok(Some(exact));
        }
    }

    // Prefix match second, so an exact id never loses to a longer one
    for dir in &project_dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl")
                && path
                    .file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().starts_with(id))
            {
                return Ok(Some(path));
            }
        }
    }

    Ok(None)
}

/// Read a transcript, skipping blank and malformed lines.
pub fn read_session(filepath: &Path) -> Result<Vec<Message>> {
    let file = fs::File::open(filepath)
        .with_context(|| format!("Could not open session file: {}", filepath.display()))?;
    let reader = BufReader::new(file);

    let messages = reader
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Message>(&line).ok())
        .collect();

    Ok(messages)
}

// =============================================================================
// Prompt Log Search
// =============================================================================

/// Case-insensitive substring search over the prompt log's display text,
/// newest matches first, at most `limit` results. A missing log is an
/// empty result, not an error.
pub fn search_history(history_file: &Path, query: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
    if !history_file.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(history_file)
        .with_context(|| format!("Could not open {}", history_file.display()))?;
    let reader = BufReader::new(file);

    let needle = query.to_lowercase();
    let finder = memmem::Finder::new(&needle);

    let matches: Vec<HistoryEntry> = reader
        .lines()
        .map_while(Result::ok)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<HistoryEntry>(&line).ok())
        .filter(|entry| finder.find(entry.display.to_lowercase().as_bytes()).is_some())
        .collect();

    // The log is append-ordered; the tail holds the most recent entries
    Ok(matches.into_iter().rev().take(limit).collect())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClaudeDirs, Config};

    fn fake_dirs(root: &Path) -> ClaudeDirs {
        let config = Config {
            claude_dir: Some(root.to_string_lossy().to_string()),
            ..Default::default()
        };
        ClaudeDirs::from_config(&config).unwrap()
    }

    fn write_transcript(dir: &Path, id: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(format!("{}.jsonl", id));
        fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    // =========================================================================
    // Project listing
    // =========================================================================

    #[test]
    fn list_projects_counts_and_sorts() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = fake_dirs(temp.path());

        let grail = dirs.projects.join("-Users-arthur-holy-grail");
        let walks = dirs.projects.join("-Users-arthur-silly-walks");
        fs::create_dir_all(&grail).unwrap();
        fs::create_dir_all(&walks).unwrap();

        write_transcript(&grail, "quest-one", &[r#"{"type":"user"}"#]);
        write_transcript(&grail, "quest-two", &[r#"{"type":"user"}"#]);
        write_transcript(&walks, "walk-one", &[r#"{"type":"user"}"#]);
        fs::write(grail.join("notes.txt"), "not a transcript").unwrap();

        let projects = list_projects(&dirs).unwrap();

        assert_eq!(projects.len(), 2);
        assert!(projects[0].decoded <= projects[1].decoded);
        let grail_proj = projects
            .iter()
            .find(|p| p.encoded.ends_with("holy-grail"))
            .unwrap();
        assert_eq!(grail_proj.session_count, 2);
    }

    #[test]
    fn list_projects_missing_dir_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = fake_dirs(&temp.path().join("nonexistent"));
        assert!(list_projects(&dirs).unwrap().is_empty());
    }

    // =========================================================================
    // Session listing
    // =========================================================================

    #[test]
    fn list_sessions_extracts_preview_and_orders_by_mtime() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = fake_dirs(temp.path());
        let project = dirs.projects.join("-Users-robin-camelot");
        fs::create_dir_all(&project).unwrap();

        let older = write_transcript(
            &project,
            "brave-sir-robin",
            &[
                r#"{"type":"user","message":{"content":"/compact"}}"#,
                r#"{"type":"user","message":{"content":"He bravely ran away"}}"#,
            ],
        );
        write_transcript(
            &project,
            "knights-of-ni",
            &[r#"{"type":"user","message":{"content":[{"type":"text","text":"Bring us a shrubbery"}]}}"#],
        );

        // Force distinct mtimes without sleeping
        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        let file = fs::File::options().append(true).open(&older).unwrap();
        file.set_modified(past).unwrap();

        let sessions = list_sessions(&dirs, "-Users-robin-camelot").unwrap();

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "knights-of-ni");
        assert_eq!(sessions[0].preview.as_deref(), Some("Bring us a shrubbery"));
        assert_eq!(sessions[1].id, "brave-sir-robin");
        // Slash command skipped, real prompt used
        assert_eq!(sessions[1].preview.as_deref(), Some("He bravely ran away"));
    }

    #[test]
    fn list_sessions_skips_subagent_transcripts() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = fake_dirs(temp.path());
        let project = dirs.projects.join("-Users-tim-cave");
        fs::create_dir_all(&project).unwrap();

        write_transcript(&project, "main-session", &[r#"{"type":"user"}"#]);
        write_transcript(&project, "agent-abc123", &[r#"{"type":"user"}"#]);

        let sessions = list_sessions(&dirs, "-Users-tim-cave").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "main-session");
    }

    #[test]
    fn all_sessions_spans_projects() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = fake_dirs(temp.path());
        let a = dirs.projects.join("-Users-a");
        let b = dirs.projects.join("-Users-b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        write_transcript(&a, "one", &[r#"{"type":"user"}"#]);
        write_transcript(&b, "two", &[r#"{"type":"user"}"#]);

        let sessions = all_sessions(&dirs).unwrap();
        assert_eq!(sessions.len(), 2);
    }

    // =========================================================================
    // Session lookup and reading
    // =========================================================================

    #[test]
    fn find_session_exact_beats_prefix() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = fake_dirs(temp.path());
        let project = dirs.projects.join("-Users-p");
        fs::create_dir_all(&project).unwrap();

        write_transcript(&project, "abc", &["{}"]);
        write_transcript(&project, "abc-longer", &["{}"]);

        let found = find_session(&dirs, "abc").unwrap().unwrap();
        assert_eq!(found.file_stem().unwrap().to_string_lossy(), "abc");
    }

    #[test]
    fn find_session_falls_back_to_prefix() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = fake_dirs(temp.path());
        let project = dirs.projects.join("-Users-p");
        fs::create_dir_all(&project).unwrap();

        write_transcript(&project, "deadbeef-cafe-0123", &["{}"]);

        let found = find_session(&dirs, "deadbeef").unwrap().unwrap();
        assert_eq!(
            found.file_stem().unwrap().to_string_lossy(),
            "deadbeef-cafe-0123"
        );
        assert!(find_session(&dirs, "nosuch").unwrap().is_none());
    }

    #[test]
    fn read_session_skips_malformed_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_transcript(
            temp.path(),
            "garbled",
            &[
                r#"{"type":"user","message":{"content":"What is your quest?"}}"#,
                "NI! NI! NI!",
                "",
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"To seek the Grail"}]}}"#,
            ],
        );

        let messages = read_session(&path).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text().as_deref(), Some("What is your quest?"));
        assert_eq!(messages[1].text().as_deref(), Some("To seek the Grail"));
    }

    #[test]
    fn message_tool_names_extracted_in_order() {
        let json = r#"{"type":"assistant","message":{"content":[
            {"type":"tool_use","name":"Bash","input":{}},
            {"type":"text","text":"running"},
            {"type":"tool_use","name":"Read","input":{}}
        ]}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.tool_names(), vec!["Bash", "Read"]);
    }

    // =========================================================================
    // Prompt log search
    // =========================================================================

    #[test]
    fn search_history_is_case_insensitive_and_newest_first() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("history.jsonl");
        fs::write(
            &log,
            [
                r#"{"display":"fix the Parrot sketch","sessionId":"s1","timestamp":1000}"#,
                r#"{"display":"deploy holy hand grenade","sessionId":"s2","timestamp":2000}"#,
                "not json at all",
                r#"{"display":"PARROT has ceased to be","sessionId":"s3","timestamp":3000}"#,
            ]
            .join("\n"),
        )
        .unwrap();

        let matches = search_history(&log, "parrot", 50).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].session_id.as_deref(), Some("s3"));
        assert_eq!(matches[1].session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn search_history_respects_limit() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("history.jsonl");
        let lines: Vec<String> = (0..10)
            .map(|i| format!(r#"{{"display":"spam number {}","timestamp":{}}}"#, i, i))
            .collect();
        fs::write(&log, lines.join("\n")).unwrap();

        let matches = search_history(&log, "spam", 3).unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].display, "spam number 9");
    }

    #[test]
    fn search_history_missing_log_is_empty() {
        let matches = search_history(Path::new("/nonexistent/history.jsonl"), "x", 10).unwrap();
        assert!(matches.is_empty());
    }
}
