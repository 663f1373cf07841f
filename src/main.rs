mod claude_code;
mod config;
mod path_decode;

use anyhow::{Context, Result};
use clap::Parser;
use claude_code::{Message, SessionEntry};
use skim::prelude::*;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// =============================================================================
// CLI Interface
// =============================================================================

#[derive(Parser)]
#[command(name = "cc-history", about = "Browse Claude Code conversation history")]
struct Args {
    /// List decoded project directories with session counts
    #[arg(long)]
    projects: bool,

    /// List sessions as a table (non-interactive)
    #[arg(long)]
    list: bool,

    /// List sessions in one project (encoded directory name or real path)
    #[arg(long, value_name = "DIR")]
    sessions: Option<String>,

    /// Number of sessions to show (for list mode)
    #[arg(long, default_value = "20")]
    count: usize,

    /// Filter by decoded project path (substring match, case-insensitive)
    #[arg(long)]
    project: Option<String>,

    /// Search the prompt history log
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,

    /// Maximum search results (overrides config)
    #[arg(long)]
    limit: Option<usize>,

    /// Print a session transcript by id (exact match or prefix)
    #[arg(long, value_name = "ID")]
    session: Option<String>,

    /// Preview a session file (internal use by interactive mode)
    #[arg(long, value_name = "FILE")]
    preview: Option<PathBuf>,
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    // Preview mode: output formatted transcript for a session file
    if let Some(ref filepath) = args.preview {
        print!("{}", render_preview(filepath)?);
        return Ok(());
    }

    let config = config::load_config()?;
    let dirs = config::ClaudeDirs::from_config(&config)?;

    if args.projects {
        print_projects(&dirs)?;
        return Ok(());
    }

    if let Some(ref query) = args.search {
        let limit = args.limit.unwrap_or(config.search.limit);
        print_history_matches(&dirs, query, limit)?;
        return Ok(());
    }

    if let Some(ref dir) = args.sessions {
        print_project_sessions(&dirs, dir)?;
        return Ok(());
    }

    if let Some(ref id) = args.session {
        let filepath = claude_code::find_session(&dirs, id)?
            .with_context(|| format!("No session found matching '{}'", id))?;
        let messages = claude_code::read_session(&filepath)?;
        print!("{}", render_transcript(&messages));
        return Ok(());
    }

    let mut sessions = claude_code::all_sessions(&dirs)?;

    // Filter matches the decoded path or the raw encoded directory name
    if let Some(ref filter) = args.project {
        let filter_lower = filter.to_lowercase();
        sessions.retain(|s| {
            s.project_decoded.to_lowercase().contains(&filter_lower)
                || s.project_encoded.to_lowercase().contains(&filter_lower)
        });
    }

    if sessions.is_empty() {
        if args.project.is_some() {
            anyhow::bail!("No sessions found matching project filter");
        }
        anyhow::bail!("No sessions found under {}", dirs.projects.display());
    }

    if args.list {
        print_sessions(&sessions, args.count);
    } else {
        interactive_mode(&sessions)?;
    }

    Ok(())
}

// =============================================================================
// Display Functions
// =============================================================================

fn print_projects(dirs: &config::ClaudeDirs) -> Result<()> {
    let projects = claude_code::list_projects(dirs)?;

    if projects.is_empty() {
        anyhow::bail!("No projects found under {}", dirs.projects.display());
    }

    println!("{:>8}  PATH", "SESSIONS");
    for project in &projects {
        println!("{:>8}  {}", project.session_count, project.decoded);
    }
    println!("Total: {} projects", projects.len());
    Ok(())
}

/// Sessions of a single project, addressed by encoded directory name or by
/// the original path (re-encoded the same way Claude Code does: `/` -> `-`).
fn print_project_sessions(dirs: &config::ClaudeDirs, dir: &str) -> Result<()> {
    let encoded = if dir.starts_with('/') {
        dir.replace('/', "-")
    } else {
        dir.to_string()
    };

    let sessions = claude_code::list_sessions(dirs, &encoded)?;
    if sessions.is_empty() {
        anyhow::bail!("No sessions found in project '{}'", dir);
    }

    println!("{:<6} {:>7} {:<38} PREVIEW", "MOD", "SIZE", "ID");
    println!("{}", "─".repeat(100));
    for session in &sessions {
        println!(
            "{:<6} {:>6}K {:<38} {}",
            format_time_relative(session.modified),
            session.size_kb,
            truncate_str(&session.id, 38),
            session.preview.as_deref().unwrap_or(""),
        );
    }
    println!("{}", "─".repeat(100));
    println!("{} sessions in {}", sessions.len(), sessions[0].project_decoded);
    Ok(())
}

fn print_sessions(sessions: &[SessionEntry], count: usize) {
    println!(
        "{:<6} {:>7} {:<20} PREVIEW",
        "MOD", "SIZE", "PROJECT"
    );
    println!("{}", "─".repeat(100));

    for session in sessions.iter().take(count) {
        println!(
            "{:<6} {:>6}K {:<20} {}",
            format_time_relative(session.modified),
            session.size_kb,
            truncate_str(&project_label(&session.project_decoded), 20),
            session.preview.as_deref().unwrap_or(""),
        );
    }

    println!("{}", "─".repeat(100));
    println!("Total: {} sessions", sessions.len());
}

fn print_history_matches(dirs: &config::ClaudeDirs, query: &str, limit: usize) -> Result<()> {
    let matches = claude_code::search_history(&dirs.history_file(), query, limit)?;

    if matches.is_empty() {
        println!("No history entries matching \"{}\"", query);
        return Ok(());
    }

    for entry in &matches {
        let when = entry
            .timestamp
            .map(|ms| format_time_relative(UNIX_EPOCH + Duration::from_millis(ms)))
            .unwrap_or_default();
        let project = entry
            .project_path
            .as_deref()
            .map(project_label)
            .unwrap_or_default();
        println!(
            "{:<6} {:<16} {}",
            when,
            truncate_str(&project, 16),
            claude_code::normalize_preview(&entry.display, 100)
        );
    }
    println!("{} matches", matches.len());
    Ok(())
}

fn format_time_relative(time: SystemTime) -> String {
    let now = SystemTime::now();
    let duration = now.duration_since(time).unwrap_or_default();
    let secs = duration.as_secs();

    if secs < 60 {
        "now".to_string()
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else if secs < 604800 {
        format!("{}d", secs / 86400)
    } else {
        format!("{}w", secs / 604800)
    }
}

/// Last component of a decoded project path, for narrow table columns
fn project_label(decoded: &str) -> String {
    decoded
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(decoded)
        .to_string()
}

/// Truncate string to max chars, adding ... if truncated
fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

// =============================================================================
// ANSI Colors (shared across rendering functions)
// =============================================================================

mod colors {
    pub const CYAN: &str = "\x1b[36m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GREEN: &str = "\x1b[32m";
    pub const DIM: &str = "\x1b[2m";
    pub const RESET: &str = "\x1b[0m";
}

// =============================================================================
// Transcript Rendering
// =============================================================================

/// Render a full transcript with colored role prefixes.
fn render_transcript(messages: &[Message]) -> String {
    let mut output = String::new();

    for msg in messages {
        match msg.kind.as_str() {
            "summary" => {
                if let Some(ref summary) = msg.summary {
                    output.push_str(&format!(
                        "{}── {} ──{}\n",
                        colors::GREEN, summary, colors::RESET
                    ));
                }
            }
            "user" => {
                if let Some(text) = msg.text() {
                    if !claude_code::is_system_text(&text) {
                        push_message(&mut output, "U", colors::CYAN, &text);
                    }
                }
            }
            "assistant" => {
                for tool in msg.tool_names() {
                    output.push_str(&format!(
                        "{}   [tool: {}]{}\n",
                        colors::DIM, tool, colors::RESET
                    ));
                }
                if let Some(text) = msg.text() {
                    push_message(&mut output, "A", colors::YELLOW, &text);
                }
            }
            _ => {}
        }
    }

    if output.is_empty() {
        output.push_str("(empty session)\n");
    }
    output
}

fn push_message(output: &mut String, prefix: &str, color: &str, text: &str) {
    for (i, line) in text.lines().enumerate() {
        let leader = if i == 0 {
            format!("{}: ", prefix)
        } else {
            "   ".to_string()
        };
        output.push_str(&format!("{}{}{}{}\n", color, leader, line, colors::RESET));
    }
}

/// Compact transcript rendering for the picker's preview pane: one line per
/// message, capped.
fn render_preview(filepath: &Path) -> Result<String> {
    const MAX_LINES: usize = 100;

    let messages = claude_code::read_session(filepath)?;
    let mut output = String::new();
    let mut line_count = 0;

    for msg in &messages {
        if line_count >= MAX_LINES {
            break;
        }

        let (prefix, color, max) = match msg.kind.as_str() {
            "user" => ("U", colors::CYAN, 120),
            "assistant" => ("A", colors::YELLOW, 80),
            _ => continue,
        };

        if let Some(text) = msg.text() {
            if prefix == "U" && claude_code::is_system_text(&text) {
                continue;
            }
            let first_line = text.lines().next().unwrap_or(&text);
            output.push_str(&format!(
                "{}{}: {}{}\n",
                color,
                prefix,
                truncate_str(first_line, max),
                colors::RESET
            ));
            line_count += 1;
        }
    }

    if output.is_empty() {
        output.push_str("(empty session)");
    }
    Ok(output)
}

// =============================================================================
// Interactive Mode (skim picker with preview pane)
// =============================================================================

fn interactive_mode(sessions: &[SessionEntry]) -> Result<()> {
    use std::collections::HashMap;

    let options = SkimOptionsBuilder::default()
        .height(Some("100%"))
        .preview(Some(""))
        .preview_window(Some("right:50%:wrap"))
        .header(Some("Select session │ enter: print transcript"))
        .prompt(Some("filter> "))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build skim options: {}", e))?;

    let (tx, rx): (SkimItemSender, SkimItemReceiver) = unbounded();

    // Lookup table: display text -> transcript path. More reliable than
    // downcasting, which can fail with skim's internal wrapping.
    let mut session_lookup: HashMap<String, PathBuf> = HashMap::new();

    for session in sessions {
        let display = format!(
            "{:<6} {:<20} {}",
            format_time_relative(session.modified),
            truncate_str(&project_label(&session.project_decoded), 20),
            session.preview.as_deref().unwrap_or(""),
        );
        session_lookup.insert(display.clone(), session.filepath.clone());

        let item = SessionItem {
            filepath: session.filepath.clone(),
            display,
        };
        let _ = tx.send(Arc::new(item));
    }
    drop(tx);

    let output = Skim::run_with(&options, Some(rx));

    match output {
        Some(out) if out.is_abort => Ok(()),
        Some(out) => {
            if let Some(item) = out.selected_items.first() {
                let display_text = item.text().to_string();
                let filepath = session_lookup
                    .get(&display_text)
                    .context("Session not found in lookup table")?;
                let messages = claude_code::read_session(filepath)?;
                print!("{}", render_transcript(&messages));
            }
            Ok(())
        }
        None => Ok(()),
    }
}

/// Session item for skim display
struct SessionItem {
    filepath: PathBuf,
    display: String,
}

impl SkimItem for SessionItem {
    fn text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.display)
    }

    fn preview(&self, _context: PreviewContext) -> ItemPreview {
        match render_preview(&self.filepath) {
            Ok(content) => ItemPreview::AnsiText(content),
            Err(_) => ItemPreview::Text("(failed to load preview)".to_string()),
        }
    }
}

// =============================================================================
// Tests (display helpers)
// =============================================================================
