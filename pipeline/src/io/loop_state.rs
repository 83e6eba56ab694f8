//! Refinement-loop descriptor file.
//!
//! While the implementation phase runs, the workspace carries a descriptor
//! at `.claude/refine-loop.local.md`: YAML frontmatter with the loop
//! bookkeeping, followed by the instruction body. The file exists only for
//! the duration of the phase; [`clear_loop_state`] removes it on every exit
//! path so no stale loop state survives into a later run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Loop bookkeeping written to the descriptor frontmatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDescriptor {
    /// Current pass, 1-indexed.
    pub iteration: u32,
    pub max_iterations: u32,
    /// Literal output substring that ends the loop.
    pub completion_marker: String,
    /// RFC 3339 timestamp of loop start.
    pub started_at: String,
}

/// Write (or rewrite) the descriptor with the instruction body.
pub fn write_loop_state(path: &Path, descriptor: &LoopDescriptor, instruction: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create loop state dir {}", parent.display()))?;
    }
    let contents = format!(
        "---\n\
        active: true\n\
        iteration: {iteration}\n\
        max_iterations: {max}\n\
        completion_marker: \"{marker}\"\n\
        started_at: \"{started}\"\n\
        ---\n\
        \n\
        {body}\n",
        iteration = descriptor.iteration,
        max = descriptor.max_iterations,
        marker = descriptor.completion_marker,
        started = descriptor.started_at,
        body = instruction.trim_end(),
    );
    fs::write(path, contents).with_context(|| format!("write loop state {}", path.display()))?;
    debug!(path = %path.display(), iteration = descriptor.iteration, "loop state written");
    Ok(())
}

/// Read the `iteration` field from an existing descriptor.
pub fn read_iteration(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read loop state {}", path.display()))?;
    Ok(parse_frontmatter_iteration(&contents))
}

/// Remove the descriptor unconditionally, returning the last recorded
/// iteration for diagnostics.
///
/// Missing files and unreadable frontmatter are not errors: cleanup must
/// succeed regardless of how the enclosed phase ended.
pub fn clear_loop_state(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let iteration = fs::read_to_string(path)
        .ok()
        .and_then(|contents| parse_frontmatter_iteration(&contents));
    fs::remove_file(path).with_context(|| format!("remove loop state {}", path.display()))?;
    debug!(path = %path.display(), last_iteration = ?iteration, "loop state cleared");
    Ok(iteration)
}

fn parse_frontmatter_iteration(contents: &str) -> Option<u32> {
    let frontmatter = split_frontmatter(contents)?;
    for line in frontmatter.lines() {
        let trimmed = line.trim();
        if let Some((key, value)) = trimmed.split_once(':')
            && key.trim() == "iteration"
        {
            return value.trim().parse().ok();
        }
    }
    None
}

/// Extract the frontmatter block. Returns None if the document doesn't start
/// with one.
fn split_frontmatter(contents: &str) -> Option<&str> {
    let after = contents.strip_prefix("---\n")?;
    let end = after.find("\n---\n")?;
    Some(&after[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(iteration: u32) -> LoopDescriptor {
        LoopDescriptor {
            iteration,
            max_iterations: 10,
            completion_marker: "IMPLEMENTATION COMPLETE".to_string(),
            started_at: "2026-08-06T09:00:00Z".to_string(),
        }
    }

    #[test]
    fn write_then_read_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".claude").join("refine-loop.local.md");

        write_loop_state(&path, &descriptor(3), "Build the game.").expect("write");
        assert_eq!(read_iteration(&path).expect("read"), Some(3));

        let contents = fs::read_to_string(&path).expect("read file");
        assert!(contents.starts_with("---\nactive: true\n"));
        assert!(contents.contains("completion_marker: \"IMPLEMENTATION COMPLETE\""));
        assert!(contents.ends_with("Build the game.\n"));
    }

    /// Cleanup must remove the descriptor and report the last iteration.
    #[test]
    fn clear_removes_file_and_reports_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("refine-loop.local.md");
        write_loop_state(&path, &descriptor(7), "body").expect("write");

        let last = clear_loop_state(&path).expect("clear");
        assert_eq!(last, Some(7));
        assert!(!path.exists());
    }

    #[test]
    fn clear_is_a_noop_when_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("refine-loop.local.md");
        assert_eq!(clear_loop_state(&path).expect("clear"), None);
    }

    #[test]
    fn malformed_frontmatter_yields_no_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("refine-loop.local.md");
        fs::write(&path, "not a descriptor").expect("write");
        assert_eq!(read_iteration(&path).expect("read"), None);
        assert_eq!(clear_loop_state(&path).expect("clear"), None);
        assert!(!path.exists());
    }
}
