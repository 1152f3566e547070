use crate::session::{BookmarkCommit, BOOKMARK_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Uncommitted work relative to the newest bookmark.
    CurrentChanges,
    /// Between the two newest bookmarks.
    RecentChanges,
    /// Between one adjacent older pair of bookmarks.
    Bookmark,
    /// From branch creation up to the oldest bookmark.
    Initial,
}

/// One displayable diff range. `from_commit == None` means "from branch
/// creation"; `to_commit == "HEAD"` on a CurrentChanges view means the
/// working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationView {
    pub kind: ViewKind,
    pub title: String,
    pub description: String,
    pub from_commit: Option<String>,
    pub to_commit: String,
}

/// File-count accessors the builder needs; implemented by the git service,
/// mocked in tests.
pub trait ChangeCounter {
    fn files_changed_since(&self, sha: &str) -> usize;
    fn files_changed_between(&self, from: &str, to: &str) -> usize;
}

pub fn strip_bookmark_prefix(subject: &str) -> &str {
    subject.strip_prefix(BOOKMARK_PREFIX).unwrap_or(subject)
}

fn file_count_label(n: usize) -> String {
    if n == 1 {
        "1 file changed".to_string()
    } else {
        format!("{} files changed", n)
    }
}

/// Build the ordered, most-recent-first view list from bookmarks ordered
/// oldest to newest. Deterministic; callers rebuild (never patch) whenever
/// the bookmark list or the dirty flag changes.
pub fn build_navigation_views(
    bookmarks: &[BookmarkCommit],
    dirty: bool,
    changes: &dyn ChangeCounter,
) -> Vec<NavigationView> {
    let mut views = Vec::new();
    let total = bookmarks.len();
    if total == 0 {
        return views;
    }

    let newest = &bookmarks[total - 1];

    if dirty {
        views.push(NavigationView {
            kind: ViewKind::CurrentChanges,
            title: "Current changes".to_string(),
            description: file_count_label(changes.files_changed_since(&newest.sha)),
            from_commit: Some(newest.sha.clone()),
            to_commit: "HEAD".to_string(),
        });
    }

    if total >= 2 {
        let second_newest = &bookmarks[total - 2];
        views.push(NavigationView {
            kind: ViewKind::RecentChanges,
            title: "Recent changes".to_string(),
            description: strip_bookmark_prefix(&newest.subject).to_string(),
            from_commit: Some(second_newest.sha.clone()),
            to_commit: newest.sha.clone(),
        });
    }

    // Adjacent older pairs, second-newest pair down to the oldest pair.
    // Pair i is (bookmarks[i-1] -> bookmarks[i]); the newest pair already
    // became the RecentChanges view above.
    for i in (1..total - 1).rev() {
        let older = &bookmarks[i - 1];
        let newer = &bookmarks[i];
        views.push(NavigationView {
            kind: ViewKind::Bookmark,
            title: format!(
                "{}/{} {}",
                i + 1,
                total,
                strip_bookmark_prefix(&newer.subject)
            ),
            description: file_count_label(changes.files_changed_between(&older.sha, &newer.sha)),
            from_commit: Some(older.sha.clone()),
            to_commit: newer.sha.clone(),
        });
    }

    let oldest = &bookmarks[0];
    views.push(NavigationView {
        kind: ViewKind::Initial,
        title: "Initial changes".to_string(),
        description: strip_bookmark_prefix(&oldest.subject).to_string(),
        from_commit: None,
        to_commit: oldest.sha.clone(),
    });

    views
}

/// Cursor over the view list plus the rendered-diff cache for the current
/// view. Left means older (higher index), right means newer.
#[derive(Debug, Default)]
pub struct DiffNavigator {
    views: Vec<NavigationView>,
    cursor: usize,
    rendered: Option<(usize, String)>,
}

impl DiffNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list; cursor returns to the newest view and the
    /// render cache is dropped.
    pub fn set_views(&mut self, views: Vec<NavigationView>) {
        self.views = views;
        self.cursor = 0;
        self.rendered = None;
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&NavigationView> {
        self.views.get(self.cursor)
    }

    pub fn can_navigate(&self) -> bool {
        self.views.len() > 1
    }

    /// Move toward older views. At the oldest view this is a no-op that
    /// leaves cursor and cache untouched.
    pub fn older(&mut self) -> bool {
        if self.cursor + 1 < self.views.len() {
            self.cursor += 1;
            self.rendered = None;
            true
        } else {
            false
        }
    }

    /// Move toward newer views; no-op at the newest.
    pub fn newer(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.rendered = None;
            true
        } else {
            false
        }
    }

    pub fn set_rendered(&mut self, view_index: usize, text: String) {
        // A late diff for a view the cursor already left is stale.
        if view_index == self.cursor {
            self.rendered = Some((view_index, text));
        }
    }

    pub fn rendered(&self) -> Option<&str> {
        match &self.rendered {
            Some((index, text)) if *index == self.cursor => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCounts;
    impl ChangeCounter for FixedCounts {
        fn files_changed_since(&self, _sha: &str) -> usize {
            3
        }
        fn files_changed_between(&self, _from: &str, _to: &str) -> usize {
            1
        }
    }

    fn bookmarks(n: usize) -> Vec<BookmarkCommit> {
        (1..=n)
            .map(|i| BookmarkCommit {
                sha: format!("sha{}", i),
                subject: format!("bookmark: step {}", i),
            })
            .collect()
    }

    #[test]
    fn three_bookmarks_no_dirty_yields_recent_bookmark_initial() {
        let views = build_navigation_views(&bookmarks(3), false, &FixedCounts);

        assert_eq!(views.len(), 3, "expected exactly 3 views for [b1,b2,b3]");

        assert_eq!(views[0].kind, ViewKind::RecentChanges);
        assert_eq!(views[0].from_commit.as_deref(), Some("sha2"));
        assert_eq!(views[0].to_commit, "sha3");

        assert_eq!(views[1].kind, ViewKind::Bookmark);
        assert_eq!(views[1].from_commit.as_deref(), Some("sha1"));
        assert_eq!(views[1].to_commit, "sha2");
        assert!(
            views[1].title.starts_with("2/3"),
            "bookmark view should be labeled by 1-based position, got {:?}",
            views[1].title
        );

        assert_eq!(views[2].kind, ViewKind::Initial);
        assert_eq!(views[2].from_commit, None);
        assert_eq!(views[2].to_commit, "sha1");
    }

    #[test]
    fn dirty_worktree_prepends_current_changes() {
        let views = build_navigation_views(&bookmarks(3), true, &FixedCounts);

        assert_eq!(views.len(), 4);
        assert_eq!(views[0].kind, ViewKind::CurrentChanges);
        assert_eq!(views[0].from_commit.as_deref(), Some("sha3"));
        assert_eq!(views[0].to_commit, "HEAD");
        assert_eq!(views[0].description, "3 files changed");
    }

    #[test]
    fn single_bookmark_no_dirty_is_one_initial_view() {
        let views = build_navigation_views(&bookmarks(1), false, &FixedCounts);

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].kind, ViewKind::Initial);
        assert_eq!(views[0].from_commit, None);
        assert_eq!(views[0].to_commit, "sha1");

        let mut nav = DiffNavigator::new();
        nav.set_views(views);
        assert!(!nav.can_navigate());
        assert!(!nav.older(), "older: must be a no-op with a single view");
        assert!(!nav.newer(), "newer: must be a no-op with a single view");
        assert_eq!(nav.cursor(), 0);
    }

    #[test]
    fn two_bookmarks_skip_pair_loop() {
        let views = build_navigation_views(&bookmarks(2), false, &FixedCounts);
        let kinds: Vec<ViewKind> = views.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViewKind::RecentChanges, ViewKind::Initial]);
    }

    #[test]
    fn five_bookmarks_order_pairs_newest_to_oldest() {
        let views = build_navigation_views(&bookmarks(5), false, &FixedCounts);
        // recent(b4->b5), bookmark(b3->b4), bookmark(b2->b3), bookmark(b1->b2), initial
        assert_eq!(views.len(), 5);
        assert_eq!(views[1].to_commit, "sha4");
        assert_eq!(views[2].to_commit, "sha3");
        assert_eq!(views[3].to_commit, "sha2");
        assert!(views[1].title.starts_with("4/5"));
        assert!(views[3].title.starts_with("2/5"));
    }

    #[test]
    fn empty_bookmarks_build_nothing() {
        let views = build_navigation_views(&[], true, &FixedCounts);
        assert!(views.is_empty());
    }

    #[test]
    fn bookmark_prefix_is_stripped_in_titles() {
        let views = build_navigation_views(&bookmarks(3), false, &FixedCounts);
        assert!(
            !views[1].title.contains("bookmark: "),
            "title: the bookmark prefix should be stripped, got {:?}",
            views[1].title
        );
        assert!(views[1].title.ends_with("step 2"));
    }

    #[test]
    fn strip_bookmark_prefix_leaves_plain_subjects() {
        assert_eq!(strip_bookmark_prefix("bookmark: wip"), "wip");
        assert_eq!(strip_bookmark_prefix("ordinary subject"), "ordinary subject");
    }

    #[test]
    fn navigator_moves_invalidate_render_cache() {
        let mut nav = DiffNavigator::new();
        nav.set_views(build_navigation_views(&bookmarks(3), false, &FixedCounts));

        nav.set_rendered(0, "diff text".to_string());
        assert_eq!(nav.rendered(), Some("diff text"));

        assert!(nav.older());
        assert_eq!(
            nav.rendered(),
            None,
            "older: cursor move must invalidate the rendered cache"
        );

        assert!(nav.newer());
        assert_eq!(nav.rendered(), None);
    }

    #[test]
    fn navigator_ignores_stale_rendered_text() {
        let mut nav = DiffNavigator::new();
        nav.set_views(build_navigation_views(&bookmarks(3), false, &FixedCounts));
        nav.older();

        // Diff for view 0 arrives after the cursor moved to view 1.
        nav.set_rendered(0, "stale".to_string());
        assert_eq!(nav.rendered(), None, "stale diff must be discarded");
    }

    #[test]
    fn navigator_clamps_at_both_ends() {
        let mut nav = DiffNavigator::new();
        nav.set_views(build_navigation_views(&bookmarks(3), false, &FixedCounts));

        assert!(!nav.newer(), "newer: no-op at the newest view");
        assert_eq!(nav.cursor(), 0);

        assert!(nav.older());
        assert!(nav.older());
        assert!(!nav.older(), "older: no-op at the oldest view");
        assert_eq!(nav.cursor(), 2);
    }

    #[test]
    fn set_views_resets_cursor_and_cache() {
        let mut nav = DiffNavigator::new();
        nav.set_views(build_navigation_views(&bookmarks(3), false, &FixedCounts));
        nav.older();
        nav.set_rendered(1, "text".to_string());

        nav.set_views(build_navigation_views(&bookmarks(2), false, &FixedCounts));
        assert_eq!(nav.cursor(), 0);
        assert_eq!(nav.rendered(), None);
    }
}
