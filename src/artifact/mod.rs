//! Locating the file a finished job produced.
//!
//! ComfyUI never tells us which file belongs to which prompt, so artifacts are
//! matched by file name: the job id is embedded in the output filename prefix
//! when the workflow is submitted, and found again here. Everything that knows
//! about that convention sits behind [`ArtifactResolver`].

pub mod media;

use std::{
    future::Future,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// How one deployment names and places its outputs.
#[derive(Clone, Debug)]
pub struct ArtifactProfile {
    /// Text written before the job id in the output filename.
    pub prefix: &'static str,
    /// Folder under the output root the backend writes into, if any.
    pub subfolder: Option<&'static str>,
    pub recursive: bool,
    /// Accepted extensions, most preferred first, without the dot.
    pub extensions: &'static [&'static str],
    /// Stem suffix of the preferred variant when a workflow writes two files
    /// per job (e.g. `-audio` for the muxed video).
    pub marker: Option<&'static str>,
    /// When set, the newest candidate younger than this is accepted even if
    /// its name does not contain the job id.
    pub freshness: Option<Duration>,
}

pub trait ArtifactResolver: Send + Sync {
    /// Find the artifact for `job_id`. Never fails; `None` means not (yet) found.
    fn resolve(&self, job_id: &str) -> impl Future<Output = Option<PathBuf>> + Send;
}

/// Resolve, and if nothing turns up, try exactly once more after `delay`.
/// The backend may report completion before the file is flushed.
pub async fn resolve_with_retry<R: ArtifactResolver>(
    resolver: &R,
    job_id: &str,
    delay: Duration,
) -> Option<PathBuf> {
    if let Some(path) = resolver.resolve(job_id).await {
        return Some(path);
    }

    tracing::debug!(job_id, "artifact not found, retrying in {:?}", delay);
    tokio::time::sleep(delay).await;
    resolver.resolve(job_id).await
}

#[derive(Clone, Debug)]
pub struct Candidate {
    pub path: PathBuf,
    name: String,
    marked: bool,
    extension_rank: usize,
    dir_rank: usize,
    modified: Option<SystemTime>,
}

/// The filename heuristic used by every deployment.
#[derive(Clone, Debug)]
pub struct PatternResolver {
    output_dir: PathBuf,
    profile: ArtifactProfile,
}

impl PatternResolver {
    pub fn new(output_dir: impl AsRef<Path>, profile: ArtifactProfile) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            profile,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.output_dir.clone()];
        // a recursive walk of the root already covers the subfolder
        if !self.profile.recursive {
            if let Some(subfolder) = self.profile.subfolder {
                dirs.push(self.output_dir.join(subfolder));
            }
        }
        dirs
    }

    /// Every file in the search folders with an accepted extension.
    pub async fn candidates(&self) -> Vec<Candidate> {
        let mut candidates = vec![];

        for (dir_rank, dir) in self.search_dirs().into_iter().enumerate() {
            for path in walk_files(&dir, self.profile.recursive).await {
                if let Some(candidate) = self.candidate(path, dir_rank).await {
                    candidates.push(candidate);
                }
            }
        }

        candidates
    }

    async fn candidate(&self, path: PathBuf, dir_rank: usize) -> Option<Candidate> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        let extension_rank = self
            .profile
            .extensions
            .iter()
            .position(|ext| *ext == extension)?;
        let name = path.file_name()?.to_string_lossy().to_string();
        let marked = match (self.profile.marker, path.file_stem()) {
            (Some(marker), Some(stem)) => stem.to_string_lossy().ends_with(marker),
            _ => false,
        };
        let modified = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        Some(Candidate {
            path,
            name,
            marked,
            extension_rank,
            dir_rank,
            modified,
        })
    }

    /// Choose the artifact for `job_id` among `candidates`:
    /// prefixed id match, then bare id match, then (if enabled) the freshest
    /// file within the freshness window.
    pub fn pick(&self, job_id: &str, candidates: &[Candidate], now: SystemTime) -> Option<PathBuf> {
        let prefixed = format!("{}{}", self.profile.prefix, job_id);

        for needle in [prefixed.as_str(), job_id] {
            let best = candidates
                .iter()
                .filter(|c| c.name.contains(needle))
                .min_by(|a, b| {
                    (!a.marked, a.extension_rank, a.dir_rank, &a.name).cmp(&(
                        !b.marked,
                        b.extension_rank,
                        b.dir_rank,
                        &b.name,
                    ))
                });

            if let Some(best) = best {
                return Some(best.path.clone());
            }
        }

        let window = self.profile.freshness?;
        let any_marked = candidates.iter().any(|c| c.marked);
        let newest = candidates
            .iter()
            .filter(|c| !any_marked || c.marked)
            .filter_map(|c| c.modified.map(|modified| (c, modified)))
            .max_by_key(|(_, modified)| *modified)?;

        match now.duration_since(newest.1) {
            Ok(age) if age < window => {
                tracing::info!(
                    job_id,
                    "no file named after the job, using recent {}",
                    newest.0.path.display()
                );
                Some(newest.0.path.clone())
            }
            // modified in the future counts as fresh
            Err(_) => Some(newest.0.path.clone()),
            _ => None,
        }
    }
}

impl ArtifactResolver for PatternResolver {
    async fn resolve(&self, job_id: &str) -> Option<PathBuf> {
        let candidates = self.candidates().await;
        self.pick(job_id, &candidates, SystemTime::now())
    }
}

/// Regular files under `dir`, descending into subfolders when `recursive`.
/// Unreadable or missing folders yield nothing.
pub async fn walk_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = vec![];
    let mut pending = vec![dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) => {
                tracing::debug!("cannot read {}: {}", dir.display(), e);
                continue;
            }
        };

        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };

            if file_type.is_dir() {
                if recursive {
                    pending.push(entry.path());
                }
            } else {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    files
}
