//! Per-run workspace creation and process-asset installation.
//!
//! Every run owns one dated directory under the outputs root. All phase
//! artifacts, run metadata, and the copied process definitions live there;
//! the directory is never relocated and persists after the run for auditing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

/// Skill definitions copied into each workspace.
const SKILLS: [&str; 4] = [
    "creative-director",
    "game-design-lead",
    "game-implementer",
    "frontend-design",
];

/// Files copied per skill directory.
const SKILL_FILES: [&str; 2] = ["SKILL.md", "LICENSE.txt"];

/// Agent definitions copied into each workspace.
const AGENTS: [&str; 1] = ["game-designer"];

/// All canonical paths within one run workspace.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub specs_dir: PathBuf,
    pub meta_path: PathBuf,
    pub gitignore_path: PathBuf,
    pub proposal_path: PathBuf,
    pub onboarding_path: PathBuf,
    pub claude_dir: PathBuf,
    pub loop_state_path: PathBuf,
}

impl WorkspacePaths {
    /// Resolve the deterministic workspace layout for `(date, tag names)`.
    ///
    /// The directory name is `<date>_<slug>_<slug>…`, e.g.
    /// `2026-08-06_roguelike_cooking`.
    pub fn new(outputs_dir: &Path, date: &str, tag_names: &[String]) -> Self {
        let slugs: Vec<String> = tag_names.iter().map(|name| slugify(name)).collect();
        let root = outputs_dir.join(format!("{}_{}", date, slugs.join("_")));
        let claude_dir = root.join(".claude");
        Self {
            specs_dir: root.join("specs"),
            meta_path: root.join("meta.json"),
            gitignore_path: root.join(".gitignore"),
            proposal_path: root.join("proposal.md"),
            onboarding_path: root.join("CLAUDE.md"),
            loop_state_path: claude_dir.join("refine-loop.local.md"),
            claude_dir,
            root,
        }
    }
}

/// Lowercase a name and collapse non-alphanumeric runs into single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Create the workspace root and its `specs/` area (idempotent).
#[instrument(skip_all, fields(root = %paths.root.display()))]
pub fn create_workspace(paths: &WorkspacePaths) -> Result<()> {
    fs::create_dir_all(&paths.root)
        .with_context(|| format!("create workspace {}", paths.root.display()))?;
    fs::create_dir_all(&paths.specs_dir)
        .with_context(|| format!("create specs dir {}", paths.specs_dir.display()))?;
    debug!("workspace created");
    Ok(())
}

/// Copy process-definition assets (skills and agent definitions) from
/// `assets_dir` into the workspace's `.claude/` directory.
///
/// Missing sources are skipped: the pipeline must still run from a checkout
/// without the full asset set. The copy records, inside the generated game
/// repository, which process produced it.
#[instrument(skip_all, fields(assets = %assets_dir.display()))]
pub fn copy_process_assets(assets_dir: &Path, paths: &WorkspacePaths) -> Result<u32> {
    let mut copied = 0u32;

    for skill in SKILLS {
        let src_dir = assets_dir.join("skills").join(skill);
        if !src_dir.exists() {
            continue;
        }
        let dest_dir = paths.claude_dir.join("skills").join(skill);
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("create skill dir {}", dest_dir.display()))?;
        for file in SKILL_FILES {
            let src = src_dir.join(file);
            if src.exists() {
                fs::copy(&src, dest_dir.join(file))
                    .with_context(|| format!("copy {}", src.display()))?;
                copied += 1;
            }
        }
    }

    for agent in AGENTS {
        let src = assets_dir.join("agents").join(format!("{agent}.md"));
        if !src.exists() {
            continue;
        }
        let dest_dir = paths.claude_dir.join("agents");
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("create agents dir {}", dest_dir.display()))?;
        fs::copy(&src, dest_dir.join(format!("{agent}.md")))
            .with_context(|| format!("copy {}", src.display()))?;
        copied += 1;
    }

    info!(copied, "process assets copied");
    Ok(copied)
}

/// Write the onboarding document for the generated game repository.
///
/// The agent runs with the workspace as its working directory; this file
/// tells it what the project is, where the authoritative documents live,
/// and which rules apply when touching the code.
pub fn write_onboarding_doc(paths: &WorkspacePaths, tag_names: &[String], date: &str) -> Result<()> {
    let content = format!(
        "# Tag-Mix Game Project\n\
        \n\
        This project is a web game prototype generated by the tag-mix pipeline.\n\
        \n\
        ## Project facts\n\
        \n\
        - **Stack**: Vite + TypeScript\n\
        - **Selected tags**: {tags}\n\
        - **Generated**: {date}\n\
        \n\
        ## Project structure\n\
        \n\
        ```\n\
        .\n\
        ├── src/              # game source code\n\
        │   ├── main.ts       # entry point\n\
        │   ├── types.ts      # type definitions\n\
        │   └── constants.ts  # numeric constants\n\
        ├── specs/            # game specification documents\n\
        │   ├── spec-*.md     # detailed specs\n\
        │   ├── guide-*.md    # design guides\n\
        │   └── review-*.md   # review results\n\
        ├── proposal.md       # game proposal\n\
        ├── index.html        # HTML entry point\n\
        ├── package.json      # dependencies\n\
        └── tsconfig.json     # TypeScript config\n\
        ```\n\
        \n\
        ## Skill reference\n\
        \n\
        | Skill | Location | Purpose |\n\
        |-------|----------|---------|\n\
        | game-implementer | .claude/skills/game-implementer/ | spec-driven implementation |\n\
        | frontend-design | .claude/skills/frontend-design/ | UI aesthetic principles |\n\
        | creative-director | .claude/skills/creative-director/ | game concept (reference) |\n\
        | game-design-lead | .claude/skills/game-design-lead/ | spec design process (reference) |\n\
        | game-designer | .claude/agents/game-designer.md | detailed spec subagent (reference) |\n\
        \n\
        ## Working rules\n\
        \n\
        1. The documents in `specs/` are the design source of truth.\n\
        2. `proposal.md` defines the core concept and player experience.\n\
        3. Verify builds with `npx tsc --noEmit` and `npm run build` after code changes.\n\
        4. Do not modify `specs/`, `proposal.md`, or `meta.json`.\n\
        5. Run the game with `npm run dev`.\n",
        tags = tag_names.join(", "),
        date = date,
    );

    fs::write(&paths.onboarding_path, content)
        .with_context(|| format!("write {}", paths.onboarding_path.display()))?;
    debug!(path = %paths.onboarding_path.display(), "onboarding doc written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn workspace_name_is_deterministic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tags = names(&["Roguelike", "Cooking"]);
        let a = WorkspacePaths::new(temp.path(), "2026-08-06", &tags);
        let b = WorkspacePaths::new(temp.path(), "2026-08-06", &tags);
        assert_eq!(a.root, b.root);
        assert!(a.root.ends_with("2026-08-06_roguelike_cooking"));
    }

    #[test]
    fn slugify_collapses_non_alphanumeric_runs() {
        assert_eq!(slugify("Pixel Graphics"), "pixel-graphics");
        assert_eq!(slugify("Post-apocalyptic"), "post-apocalyptic");
        assert_eq!(slugify("  Match  3!"), "match-3");
    }

    #[test]
    fn create_workspace_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = WorkspacePaths::new(temp.path(), "2026-08-06", &names(&["Puzzle"]));
        create_workspace(&paths).expect("create");
        create_workspace(&paths).expect("create again");
        assert!(paths.root.is_dir());
        assert!(paths.specs_dir.is_dir());
    }

    #[test]
    fn copy_assets_skips_missing_sources() {
        let temp = tempfile::tempdir().expect("tempdir");
        let assets = temp.path().join("assets");
        let skill_dir = assets.join("skills").join("creative-director");
        fs::create_dir_all(&skill_dir).expect("mkdir");
        fs::write(skill_dir.join("SKILL.md"), "# skill\n").expect("write");

        let paths = WorkspacePaths::new(temp.path(), "2026-08-06", &names(&["Puzzle"]));
        create_workspace(&paths).expect("create");

        let copied = copy_process_assets(&assets, &paths).expect("copy");
        assert_eq!(copied, 1);
        assert!(
            paths
                .claude_dir
                .join("skills/creative-director/SKILL.md")
                .is_file()
        );
        assert!(!paths.claude_dir.join("skills/game-design-lead").exists());
    }

    #[test]
    fn onboarding_doc_lists_tags_and_date() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tags = names(&["Roguelike", "Cooking"]);
        let paths = WorkspacePaths::new(temp.path(), "2026-08-06", &tags);
        create_workspace(&paths).expect("create");
        write_onboarding_doc(&paths, &tags, "2026-08-06").expect("write");

        let doc = fs::read_to_string(&paths.onboarding_path).expect("read");
        assert!(doc.contains("Roguelike, Cooking"));
        assert!(doc.contains("2026-08-06"));
        assert!(doc.contains("game-implementer"));
    }
}
