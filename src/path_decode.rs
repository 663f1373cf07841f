//! Encoded project path decoding.
//!
//! Claude Code flattens a project's absolute path into a directory name by
//! replacing every `/` with `-`: `/home/user/my-project` becomes
//! `-home-user-my-project`. The encoding is lossy because directory names
//! may themselves contain hyphens, so `-home-user-my-project` could mean
//! `/home/user/my-project` or `/home/user/my/project`.
//!
//! Decoding searches every way of regrouping the hyphen-separated tokens
//! into path components and picks the grouping that matches the most real
//! directories on disk, consulting an injected [`DirProbe`] so tests can
//! run against a fake tree.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

// =============================================================================
// Filesystem Probe
// =============================================================================

/// Existence check the decoder validates candidate components against.
///
/// Implementations must treat every probe failure (missing path, permission
/// error, I/O error) as `false`; the decoder has no error channel. Probes
/// may be called concurrently when many project names are decoded in
/// parallel, so implementations must be `Sync`.
pub trait DirProbe: Sync {
    fn is_dir(&self, path: &Path) -> bool;
}

/// Probe backed by the real filesystem.
pub struct FsProbe;

impl DirProbe for FsProbe {
    fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }
}

/// Closures work as probes, which keeps test trees out of the real fs.
impl<F: Fn(&Path) -> bool + Sync> DirProbe for F {
    fn is_dir(&self, path: &Path) -> bool {
        self(path)
    }
}

// =============================================================================
// Decoding
// =============================================================================

const DELIMITER: char = '-';

/// Split an encoded directory name into its hyphen-separated tokens.
///
/// One leading hyphen is stripped (the encoding of the root separator);
/// rejoining the tokens with hyphens reproduces the rest of the input
/// exactly.
fn tokenize(encoded: &str) -> Vec<&str> {
    let normalized = encoded.strip_prefix(DELIMITER).unwrap_or(encoded);
    if normalized.is_empty() {
        return Vec::new();
    }
    normalized.split(DELIMITER).collect()
}

/// Best segmentation of a token suffix: how many chosen components were
/// confirmed as directories, how many components were used in total, and
/// the components themselves.
#[derive(Clone)]
struct Best {
    validated: usize,
    total: usize,
    segments: Vec<String>,
}

/// Decode an encoded project directory name back to an absolute path.
///
/// Tries every way of regrouping the tokens into path components
/// (2^(n-1) segmentations for n tokens) and keeps the one that validates
/// the most components against `probe`, breaking ties in favor of fewer,
/// longer components. The search is memoized and never fails: with nothing
/// on disk it falls back to the coarsest grouping.
pub fn decode_path(encoded: &str, probe: &impl DirProbe) -> String {
    let tokens = tokenize(encoded);
    if tokens.is_empty() {
        return "/".to_string();
    }

    let mut memo = HashMap::new();
    let best = best_from(&tokens, 0, Path::new("/"), probe, &mut memo);
    format!("/{}", best.segments.join("/"))
}

/// Best segmentation of `tokens[start..]` given the real path confirmed for
/// everything before `start`.
///
/// Memoized on `(start, current)`: the confirmed prefix only advances past
/// components the probe accepted, so distinct keys stay few in practice and
/// cached results are exact, not approximate.
fn best_from(
    tokens: &[&str],
    start: usize,
    current: &Path,
    probe: &impl DirProbe,
    memo: &mut HashMap<(usize, PathBuf), Best>,
) -> Best {
    if start >= tokens.len() {
        return Best {
            validated: 0,
            total: 0,
            segments: Vec::new(),
        };
    }

    let key = (start, current.to_path_buf());
    if let Some(cached) = memo.get(&key) {
        return cached.clone();
    }

    let mut best: Option<Best> = None;
    let mut component = String::new();

    for end in start..tokens.len() {
        if !component.is_empty() {
            component.push(DELIMITER);
        }
        component.push_str(tokens[end]);

        let candidate = current.join(&component);
        let is_valid = probe.is_dir(&candidate);

        // The confirmed prefix only advances past a validated component;
        // later checks stay anchored to the last real directory.
        let sub = best_from(
            tokens,
            end + 1,
            if is_valid { candidate.as_path() } else { current },
            probe,
            memo,
        );

        let validated = usize::from(is_valid) + sub.validated;
        let total = 1 + sub.total;

        let improves = match &best {
            None => true,
            Some(b) => validated > b.validated || (validated == b.validated && total < b.total),
        };
        if improves {
            let mut segments = Vec::with_capacity(1 + sub.segments.len());
            segments.push(component.clone());
            segments.extend(sub.segments);
            best = Some(Best {
                validated,
                total,
                segments,
            });
        }
    }

    // The loop body runs at least once when start < tokens.len()
    let best = best.unwrap_or(Best {
        validated: 0,
        total: 0,
        segments: Vec::new(),
    });
    memo.insert(key, best.clone());
    best
}

// =============================================================================
// Tests
// =============================================================================
