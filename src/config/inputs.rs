use crate::config::snippets;
use failure::{Fallible, ResultExt};
use std::path::{Path, PathBuf};

/// Configuration sub-directory, relative to each base directory.
static CONFIG_SUBDIR: &str = "updraft/config.d";

/// Runtime configuration holding environmental inputs.
#[derive(Debug)]
pub(crate) struct ConfigInput {
    pub(crate) updates: UpdatesInput,
    pub(crate) storage: StorageInput,
}

impl ConfigInput {
    /// Read config snippets and merge them into a single config.
    pub(crate) fn read_config(dirs: &[PathBuf]) -> Fallible<Self> {
        let mut snips = vec![];
        for path in snippet_paths(dirs)? {
            snips.push(read_snippet(&path)?);
        }

        let cfg = Self::merge_snippets(snips);
        debug!("configuration input: {:?}", cfg);

        Ok(cfg)
    }

    /// Merge multiple snippets into a single configuration.
    pub(crate) fn merge_snippets(snippets: Vec<snippets::ConfigSnippet>) -> Self {
        let mut updates = vec![];
        let mut storages = vec![];

        for snip in snippets {
            if let Some(u) = snip.updates {
                updates.push(u);
            }
            if let Some(s) = snip.storage {
                storages.push(s);
            }
        }

        Self {
            updates: UpdatesInput::from_snippets(updates),
            storage: StorageInput::from_snippets(storages),
        }
    }
}

/// Collect `*.toml` snippet paths, ordered by directory then file name.
fn snippet_paths(dirs: &[PathBuf]) -> Fallible<Vec<PathBuf>> {
    let mut all = vec![];
    for base in dirs {
        let dir = base.join(CONFIG_SUBDIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("skipping missing config directory {:?}", dir);
                continue;
            }
            Err(e) => bail!("failed to list '{}': {}", dir.display(), e),
        };

        let mut paths = vec![];
        for entry in entries {
            let path = entry.context("failed to read directory entry")?.path();
            if path.extension().map(|ext| ext == "toml").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();
        all.extend(paths);
    }
    Ok(all)
}

fn read_snippet(path: &Path) -> Fallible<snippets::ConfigSnippet> {
    trace!("reading config snippet from {:?}", path);
    let content =
        std::fs::read(path).context(format!("failed to read file '{}'", path.display()))?;
    let snippet = toml::from_slice(&content)
        .context(format!("failed to parse TOML in '{}'", path.display()))?;
    Ok(snippet)
}

#[derive(Debug, Default)]
pub(crate) struct UpdatesInput {
    pub(crate) check_timeout_ms: Option<u64>,
    pub(crate) priority_threshold: Option<i32>,
    pub(crate) staleness_threshold_days: Option<i32>,
    pub(crate) cooldown_hours: Option<u64>,
}

impl UpdatesInput {
    fn from_snippets(snippets: Vec<snippets::UpdatesSnippet>) -> Self {
        let mut cfg = Self::default();

        for snip in snippets {
            if let Some(t) = snip.check_timeout_ms {
                cfg.check_timeout_ms = Some(t);
            }
            if let Some(p) = snip.priority_threshold {
                cfg.priority_threshold = Some(p);
            }
            if let Some(s) = snip.staleness_threshold_days {
                cfg.staleness_threshold_days = Some(s);
            }
            if let Some(c) = snip.cooldown_hours {
                cfg.cooldown_hours = Some(c);
            }
        }

        cfg
    }
}

#[derive(Debug)]
pub(crate) struct StorageInput {
    pub(crate) state_dir: String,
}

impl StorageInput {
    fn from_snippets(snippets: Vec<snippets::StorageSnippet>) -> Self {
        let mut cfg = Self {
            state_dir: String::new(),
        };

        for snip in snippets {
            if let Some(d) = snip.state_dir {
                cfg.state_dir = d;
            }
        }

        cfg
    }
}
