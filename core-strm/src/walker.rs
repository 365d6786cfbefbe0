//! # Remote Tree Walker
//!
//! Depth-first enumeration of a remote directory subtree, yielding leaf files
//! page by page. Pending directories live on an explicit stack, so tree depth
//! is bounded by memory rather than by the call stack.
//!
//! Every page request waits on a shared [`Cooldown`]. A throttled request
//! surfaces as [`StrmError::RateLimited`] and leaves the walker positioned on
//! the same page: calling [`RemoteTreeWalker::next_batch`] again retries it,
//! [`RemoteTreeWalker::skip_current`] abandons the directory.

use bridge_traits::drive::{ChildPage, RemoteDrive, RemoteNode, ShareContext};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cooldown::Cooldown;
use crate::error::Result;
use crate::mapping::join_remote;

/// Children requested per listing call
pub const DEFAULT_PAGE_SIZE: u64 = 1150;

/// Which listing API backs the walk
#[derive(Debug, Clone)]
pub enum ListingScope {
    /// The session's own drive
    Private,
    /// A public share addressed by its codes
    Share(ShareContext),
}

/// A leaf file found during the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Remote directory containing the file, rooted at the walk's root path
    pub remote_dir: String,
    pub node: RemoteNode,
}

impl WalkEntry {
    /// Full remote path of the file
    pub fn remote_path(&self) -> String {
        join_remote(&self.remote_dir, &self.node.name)
    }
}

#[derive(Debug)]
struct PendingDir {
    id: String,
    path: String,
    offset: u64,
}

/// Lazily walks one remote subtree
pub struct RemoteTreeWalker {
    drive: Arc<dyn RemoteDrive>,
    scope: ListingScope,
    cooldown: Arc<Cooldown>,
    page_size: u64,
    current: Option<PendingDir>,
    stack: Vec<PendingDir>,
    visited: HashSet<String>,
    pages_fetched: u64,
}

impl RemoteTreeWalker {
    /// Start a walk at `root_id`, whose remote path is `root_path`
    pub fn new(
        drive: Arc<dyn RemoteDrive>,
        scope: ListingScope,
        cooldown: Arc<Cooldown>,
        root_id: impl Into<String>,
        root_path: impl Into<String>,
    ) -> Self {
        let root_id = root_id.into();
        let mut visited = HashSet::new();
        visited.insert(root_id.clone());

        Self {
            drive,
            scope,
            cooldown,
            page_size: DEFAULT_PAGE_SIZE,
            current: None,
            stack: vec![PendingDir {
                id: root_id,
                path: root_path.into(),
                offset: 0,
            }],
            visited,
            pages_fetched: 0,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Listing calls made so far
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Remote path of the directory being listed, if any
    pub fn current_dir(&self) -> Option<&str> {
        self.current.as_ref().map(|dir| dir.path.as_str())
    }

    /// Abandon the directory currently being listed
    pub fn skip_current(&mut self) -> Option<String> {
        self.current.take().map(|dir| dir.path)
    }

    /// Leaves of the next non-empty page, or `None` once the tree is exhausted
    #[instrument(skip(self))]
    pub async fn next_batch(&mut self) -> Result<Option<Vec<WalkEntry>>> {
        loop {
            let dir = match self.current.take() {
                Some(dir) => dir,
                None => match self.stack.pop() {
                    Some(dir) => dir,
                    None => return Ok(None),
                },
            };

            self.cooldown.wait().await;
            let page = match self.list(&dir).await {
                Ok(page) => page,
                Err(e) => {
                    self.current = Some(dir);
                    return Err(e);
                }
            };
            self.pages_fetched += 1;

            let returned = page.nodes.len() as u64;
            let next_offset = dir.offset + returned;
            debug!(
                "Listed {} entries of {} (offset {}, total {})",
                returned, dir.path, dir.offset, page.total
            );

            let mut leaves = Vec::new();
            for node in page.nodes {
                if node.is_directory {
                    if self.visited.insert(node.id.clone()) {
                        self.stack.push(PendingDir {
                            id: node.id.clone(),
                            path: join_remote(&dir.path, &node.name),
                            offset: 0,
                        });
                    }
                } else {
                    leaves.push(WalkEntry {
                        remote_dir: dir.path.clone(),
                        node,
                    });
                }
            }

            if returned > 0 && next_offset < page.total {
                self.current = Some(PendingDir {
                    offset: next_offset,
                    ..dir
                });
            }

            if !leaves.is_empty() {
                return Ok(Some(leaves));
            }
        }
    }

    /// Drain the whole walk; used where the tree is known to be small
    pub async fn collect_all(&mut self) -> Result<Vec<WalkEntry>> {
        let mut all = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            all.extend(batch);
        }
        Ok(all)
    }

    async fn list(&self, dir: &PendingDir) -> Result<ChildPage> {
        let page = match &self.scope {
            ListingScope::Private => {
                self.drive
                    .list_children(&dir.id, dir.offset, self.page_size)
                    .await?
            }
            ListingScope::Share(share) => {
                self.drive
                    .list_share_children(share, &dir.id, dir.offset, self.page_size)
                    .await?
            }
        };
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDrive;
    use crate::StrmError;
    use std::time::Duration;
    use tokio::time::Instant;

    fn walker(drive: Arc<FakeDrive>, cooldown: Duration) -> RemoteTreeWalker {
        RemoteTreeWalker::new(
            drive,
            ListingScope::Private,
            Arc::new(Cooldown::new(cooldown)),
            "10",
            "/Pan/Media",
        )
    }

    fn sample_drive() -> FakeDrive {
        let drive = FakeDrive::new();
        drive.add_dir("10", "0", "Media");
        drive.add_dir("11", "10", "Show");
        drive.add_dir("12", "11", "Season 1");
        drive.add_dir("13", "10", "Empty");
        drive.add_file("100", "10", "Movie.mkv", Some("aaaaaaaaaaaaaaaa1"));
        drive.add_file("101", "12", "S01E01.mkv", Some("bbbbbbbbbbbbbbbb1"));
        drive.add_file("102", "12", "S01E02.mkv", Some("bbbbbbbbbbbbbbbb2"));
        drive
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_yields_every_leaf_once() {
        let drive = Arc::new(sample_drive());
        let mut walker = walker(drive, Duration::from_millis(10));

        let mut paths: Vec<String> = walker
            .collect_all()
            .await
            .unwrap()
            .iter()
            .map(WalkEntry::remote_path)
            .collect();
        paths.sort();

        assert_eq!(
            paths,
            vec![
                "/Pan/Media/Movie.mkv",
                "/Pan/Media/Show/Season 1/S01E01.mkv",
                "/Pan/Media/Show/Season 1/S01E02.mkv",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_follows_total() {
        let drive = FakeDrive::new();
        for i in 0..5 {
            drive.add_file(
                &format!("{}", 200 + i),
                "10",
                &format!("E0{}.mkv", i),
                Some("cccccccccccccccc1"),
            );
        }
        let drive = Arc::new(drive);
        let mut walker = walker(drive, Duration::from_millis(10)).with_page_size(2);

        let entries = walker.collect_all().await.unwrap();

        assert_eq!(entries.len(), 5);
        assert_eq!(walker.pages_fetched(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_pages() {
        let drive = Arc::new(sample_drive());
        let mut walker = walker(drive, Duration::from_secs(2));
        let start = Instant::now();

        walker.collect_all().await.unwrap();

        // four directories, one page each
        assert_eq!(walker.pages_fetched(), 4);
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_keeps_position() {
        let drive = Arc::new(sample_drive());
        drive.throttle_next_listings(1);
        let mut walker = walker(drive.clone(), Duration::from_millis(10));

        let err = walker.next_batch().await.unwrap_err();
        assert!(matches!(err, StrmError::RateLimited(_)));
        assert_eq!(walker.current_dir(), Some("/Pan/Media"));

        let mut total = 0;
        while let Some(batch) = walker.next_batch().await.unwrap() {
            total += batch.len();
        }
        assert_eq!(total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_current_abandons_directory() {
        let drive = Arc::new(sample_drive());
        drive.throttle_next_listings(1);
        let mut walker = walker(drive, Duration::from_millis(10));

        assert!(walker.next_batch().await.is_err());
        assert_eq!(walker.skip_current(), Some("/Pan/Media".to_string()));
        assert!(walker.next_batch().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_cycles_are_not_followed() {
        let drive = FakeDrive::new();
        drive.add_dir("11", "10", "Loop");
        drive.add_dir("10", "11", "Back");
        drive.add_file("100", "11", "a.mkv", Some("aaaaaaaaaaaaaaaa1"));
        let drive = Arc::new(drive);
        let mut walker = walker(drive, Duration::from_millis(10));

        let entries = walker.collect_all().await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(walker.pages_fetched(), 2);
    }
}
