//! Location of the classifier-scored event stores
//!
//! The scoring step may lay its outputs out in several ways, so a fixed list
//! of candidate directories is searched in order. Matching file names is a
//! pure function, the filesystem is only used to list directories.

use crate::store::STORE_EXTENSION;

use tracing::warn;

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default suffix added by the scoring step
pub const DEFAULT_BDT_SUFFIX: &str = "_wScores";

/// What the scored file of a (sample, region) looks like
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoredFileQuery<'a> {
    /// Sample name, used as an optional directory level
    pub sample: &'a str,

    /// Region name
    pub region: &'a str,

    /// Stem of the original input file
    pub core_name: &'a str,

    /// Suffix appended by the scoring step
    pub suffix: &'a str,

    /// Trigger mode tag, keeps outputs of different modes apart
    pub trigger_tag: &'a str,
}
//
impl ScoredFileQuery<'_> {
    /// Directories to be searched, in order
    pub fn candidate_dirs(&self, base: &Path) -> [PathBuf; 4] {
        let scored_region = format!("{}{DEFAULT_BDT_SUFFIX}", self.region);
        [
            base.join(self.region),
            base.join(&scored_region),
            base.join(self.sample).join(self.region),
            base.join(self.sample).join(&scored_region),
        ]
    }

    /// Select the matching file names, sorted
    pub fn matches<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> Vec<&'n str> {
        let ending = format!("{}.{STORE_EXTENSION}", self.suffix);
        let mut matches = names
            .into_iter()
            .filter(|name| {
                name.starts_with(self.core_name)
                    && name.ends_with(&ending)
                    && name.contains(self.trigger_tag)
            })
            .collect::<Vec<_>>();
        matches.sort_unstable();
        matches
    }

    /// Search the candidate directories for the scored file
    ///
    /// The first directory with at least one match wins. If there are several
    /// matches in there, the first one is used and a warning is emitted.
    ///
    pub fn find(&self, base: &Path) -> Option<PathBuf> {
        for dir in self.candidate_dirs(base) {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            let names = entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect::<Vec<_>>();
            let matches = self.matches(names.iter().map(String::as_str));
            match matches.as_slice() {
                [] => continue,
                [single] => return Some(dir.join(single)),
                [first, ..] => {
                    warn!(
                        "Ambiguous match in {}: {matches:?}. Using {first}",
                        dir.display()
                    );
                    return Some(dir.join(first));
                }
            }
        }
        None
    }
}
