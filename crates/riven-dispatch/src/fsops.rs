//! Library symlink templating and path-keyed locking for the Symlinker
//! handler. Scoped to exactly what that handler needs — not a
//! general filesystem abstraction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use riven_core::{ItemKind, MediaItem};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

/// Errors from creating a library symlink.
#[derive(Debug, Error)]
pub enum FsopsError {
    /// The source file never became visible under the mount root within the
    /// retry budget.
    #[error("source file {path} not visible after {attempts} attempts")]
    SourceNotVisible {
        /// The source path that was polled.
        path: PathBuf,
        /// How many attempts were made.
        attempts: u32,
    },
    /// An unexpected filesystem error (permissions, disk full,...).
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounded, increasing-delay retry schedule for symlink creation.
const RETRY_ATTEMPTS: u32 = 6;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// Build the destination path for a movie:
/// `movies/{title} ({year})/{title} ({year}).{ext}`.
#[must_use]
pub fn movie_path(library_root: &Path, title: &str, year: Option<i32>, ext: &str) -> PathBuf {
    let label = labelled(title, year);
    library_root
    .join("movies")
    .join(&label)
    .join(format!("{label}.{ext}"))
}

/// Build the destination path for an episode:
/// `shows/{show_title} ({show_year})/Season {NN}/{show_title} - s{NN}e{MM} - {episode_title}.{ext}`.
#[must_use]
pub fn episode_path(
    library_root: &Path,
    show_title: &str,
    show_year: Option<i32>,
    season_number: i32,
    episode_number: i32,
    episode_title: &str,
    ext: &str,
) -> PathBuf {
    let show_label = labelled(show_title, show_year);
    let season_dir = format!("Season {season_number:02}");
    let file_name = format!(
        "{show_title} - s{season_number:02}e{episode_number:02} - {episode_title}.{ext}"
    );
    library_root
    .join("shows")
    .join(show_label)
    .join(season_dir)
    .join(file_name)
}

fn labelled(title: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{title} ({year})"),
        None => title.to_string(),
    }
}

/// Resolve the template path for `item`, given the show's title/year when
/// `item` is an episode (movies carry their own title/year directly).
///
/// # Errors
///
/// Returns `FsopsError::Io` indirectly never; this is pure path
/// construction. Returns an error only if the item is missing the ordinals a
/// template requires.
pub fn template_for(
    library_root: &Path,
    item: &MediaItem,
    show_title: Option<&str>,
    show_year: Option<i32>,
    ext: &str,
) -> Result<PathBuf, FsopsError> {
    match item.kind {
        ItemKind::Movie => Ok(movie_path(library_root, &item.title, item.year, ext)),
        ItemKind::Episode => {
            let show_title = show_title.unwrap_or(&item.title);
            let season_number = item.season_number.unwrap_or(1);
            let episode_number = item.episode_number.unwrap_or(1);
            Ok(episode_path(
                    library_root,
                    show_title,
                    show_year,
                    season_number,
                    episode_number,
                    &item.title,
                    ext,
            ))
        }
        ItemKind::Show | ItemKind::Season => Err(FsopsError::Io(std::io::Error::other(
                    "aggregate items are never symlinked directly",
        ))),
    }
}

/// Serialises writes to the library tree and polls the rclone mount for
/// source-file visibility before creating a symlink.
#[derive(Clone)]
pub struct Fsops {
    mount_root: PathBuf,
    library_root: PathBuf,
    dir_locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
    retry_base_delay: Duration,
}

impl Fsops {
    /// Build an `Fsops` rooted at the rclone mount and the library tree.
    #[must_use]
    pub fn new(mount_root: PathBuf, library_root: PathBuf) -> Self {
        Self {
            mount_root,
            library_root,
            dir_locks: Arc::new(Mutex::new(HashMap::new())),
            retry_base_delay: RETRY_BASE_DELAY,
        }
    }

    /// Override the base retry delay (tests only need this to avoid real
    /// multi-second waits; production always uses the configured default).
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    #[must_use]
    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    fn lock_for(&self, dir: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.dir_locks.lock().expect("fsops lock map poisoned");
        locks
        .entry(dir.to_path_buf())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
    }

    /// Create a symlink at `dest` pointing at `folder`/`file_name` under the
    /// mount root, retrying with increasing delay until the source becomes
    /// visible or the budget is exhausted. Concurrent calls targeting the
    /// same destination directory (e.g. two episodes of the same season) are
    /// serialised so directory creation never races.
    ///
    /// # Errors
    ///
    /// Returns `FsopsError::SourceNotVisible` if the source never appears, or
    /// `FsopsError::Io` on any other filesystem failure.
    pub async fn create_symlink(
        &self,
        folder: Option<&str>,
        file_name: &str,
        dest: &Path,
    ) -> Result<PathBuf, FsopsError> {
        let mut source = self.mount_root.clone();
        if let Some(folder) = folder {
            source.push(folder);
        }
        source.push(file_name);

        let mut attempt = 0;
        loop {
            match tokio::fs::metadata(&source).await {
                Ok(_) => break,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    attempt += 1;
                    if attempt >= RETRY_ATTEMPTS {
                        return Err(FsopsError::SourceNotVisible {
                                path: source,
                                attempts: attempt,
                        });
                    }
                    tokio::time::sleep(self.retry_base_delay * attempt).await;
                }
                Err(err) => return Err(FsopsError::Io(err)),
            }
        }

        let parent = dest.parent().map(Path::to_path_buf).unwrap_or_default();
        let lock = self.lock_for(&parent);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&parent).await?;
        match tokio::fs::symlink(&source, dest).await {
            Ok(()) => Ok(dest.to_path_buf()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(dest.to_path_buf()),
            Err(err) => Err(FsopsError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_path_matches_template() {
        let path = movie_path(Path::new("/lib"), "Tron: Legacy", Some(2010), "mkv");
        assert_eq!(
            path,
            PathBuf::from("/lib/movies/Tron: Legacy (2010)/Tron: Legacy (2010).mkv")
        );
    }

    #[test]
    fn episode_path_matches_template() {
        let path = episode_path(Path::new("/lib"), "Breaking Bad", Some(2008), 1, 3, "...And the Bag's in the River", "mkv");
        assert_eq!(
            path,
            PathBuf::from(
                "/lib/shows/Breaking Bad (2008)/Season 01/Breaking Bad - s01e03 - ...And the Bag's in the River.mkv"
            )
        );
    }

    #[tokio::test]
    async fn create_symlink_retries_until_source_visible() {
        let tmp = std::env::temp_dir().join(format!("riven-fsops-test-{}", uuid::Uuid::new_v4()));
        let mount = tmp.join("mount");
        let library = tmp.join("library");
        tokio::fs::create_dir_all(&mount).await.unwrap();

        let fsops =
        Fsops::new(mount.clone(), library.clone()).with_retry_delay(Duration::from_millis(20));
        let dest = library.join("movies/X (2020)/X (2020).mkv");

        let source = mount.join("X.mkv");
        tokio::spawn({
                let source = source.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    tokio::fs::write(&source, b"data").await.unwrap();
                }
        });

        let result = fsops.create_symlink(None, "X.mkv", &dest).await;
        assert!(result.is_ok(), "expected symlink to succeed: {result:?}");
        assert!(tokio::fs::symlink_metadata(&dest).await.is_ok());

        tokio::fs::remove_dir_all(&tmp).await.ok();
    }
}
