//! Subjects and their page chains
//!
//! One subject is one respondent's run through a survey. Pages live in a
//! per-subject arena (`Vec<PageNode>`) with explicit prev/next indices;
//! traversal moves one link at a time and never skips pages. Exactly one
//! page is current at any time.

use crate::feed::Feed;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One node of a subject's page chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageNode {
    pub id: Uuid,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub is_current: bool,
    pub feed: Feed,
}

impl PageNode {
    pub fn is_complete(&self) -> bool {
        self.feed.is_complete()
    }
}

/// One respondent's run through a survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub description: String,
    /// Page arena; node indices are stable, chain order is arena order
    pub pages: Vec<PageNode>,
}

impl Subject {
    pub fn new(survey_id: Uuid, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            survey_id,
            description: description.to_string(),
            pages: Vec::new(),
        }
    }

    /// Append a page holding `feed` to the tail of the chain
    pub fn push_page(&mut self, feed: Feed) -> usize {
        let index = self.pages.len();
        let prev = index.checked_sub(1);
        if let Some(p) = prev {
            self.pages[p].next = Some(index);
        }
        self.pages.push(PageNode {
            id: Uuid::new_v4(),
            prev,
            next: None,
            is_current: false,
            feed,
        });
        index
    }

    pub fn current_index(&self) -> Option<usize> {
        self.pages.iter().position(|p| p.is_current)
    }

    pub fn current_page(&self) -> Result<&PageNode> {
        self.current_index()
            .map(|i| &self.pages[i])
            .ok_or_else(|| Error::Internal(format!("subject {} has no current page", self.id)))
    }

    /// The feed the subject is looking at right now
    pub fn current_feed(&self) -> Result<&Feed> {
        Ok(&self.current_page()?.feed)
    }

    /// Move the current pointer one page forward. No-op at the chain end.
    /// Returns the new current page id when a move happened.
    pub fn advance(&mut self) -> Result<Option<Uuid>> {
        let current = self
            .current_index()
            .ok_or_else(|| Error::Internal(format!("subject {} has no current page", self.id)))?;
        match self.pages[current].next {
            Some(next) => {
                self.pages[current].is_current = false;
                self.pages[next].is_current = true;
                Ok(Some(self.pages[next].id))
            }
            None => Ok(None),
        }
    }

    /// Move the current pointer one page back. No-op at the chain start.
    pub fn retreat(&mut self) -> Result<Option<Uuid>> {
        let current = self
            .current_index()
            .ok_or_else(|| Error::Internal(format!("subject {} has no current page", self.id)))?;
        match self.pages[current].prev {
            Some(prev) => {
                self.pages[current].is_current = false;
                self.pages[prev].is_current = true;
                Ok(Some(self.pages[prev].id))
            }
            None => Ok(None),
        }
    }

    /// A subject is done once every page's feed is complete
    pub fn is_complete(&self) -> bool {
        self.pages.iter().all(|p| p.is_complete())
    }

    /// Whether the page at `index` is the first question-bearing page
    /// (its neighbour toward the head is a marker or the chain boundary)
    pub fn is_effectively_first(&self, index: usize) -> bool {
        match self.pages[index].prev {
            None => true,
            Some(p) => self.pages[p].feed.is_marker(),
        }
    }

    /// Symmetric check toward the tail
    pub fn is_effectively_last(&self, index: usize) -> bool {
        match self.pages[index].next {
            None => true,
            Some(n) => self.pages[n].feed.is_marker(),
        }
    }

    pub fn feed(&self, feed_id: Uuid) -> Option<&Feed> {
        self.pages.iter().map(|p| &p.feed).find(|f| f.id() == feed_id)
    }

    pub fn feed_mut(&mut self, feed_id: Uuid) -> Option<&mut Feed> {
        self.pages.iter_mut().map(|p| &mut p.feed).find(|f| f.id() == feed_id)
    }

    /// Page holding the given feed
    pub fn page_of_feed(&self, feed_id: Uuid) -> Option<&PageNode> {
        self.pages.iter().find(|p| p.feed.id() == feed_id)
    }

    fn count_current(&self) -> usize {
        self.pages.iter().filter(|p| p.is_current).count()
    }

    /// Invariant check used by tests and the store load path
    pub fn check_single_current(&self) -> Result<()> {
        match self.count_current() {
            1 => Ok(()),
            n => Err(Error::Internal(format!(
                "subject {} has {} current pages",
                self.id, n
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{EndFeed, SectionFeed};

    fn marker() -> Feed {
        Feed::Section(SectionFeed { id: Uuid::new_v4(), section_id: Uuid::new_v4() })
    }

    fn chain(n_markers: usize) -> Subject {
        let mut subject = Subject::new(Uuid::new_v4(), "tester");
        for _ in 0..n_markers {
            subject.push_page(marker());
        }
        subject.push_page(Feed::End(EndFeed { id: Uuid::new_v4() }));
        subject.pages[0].is_current = true;
        subject
    }

    #[test]
    fn push_page_wires_neighbour_links() {
        let subject = chain(2);
        assert_eq!(subject.pages.len(), 3);
        assert_eq!(subject.pages[0].prev, None);
        assert_eq!(subject.pages[0].next, Some(1));
        assert_eq!(subject.pages[1].prev, Some(0));
        assert_eq!(subject.pages[1].next, Some(2));
        assert_eq!(subject.pages[2].prev, Some(1));
        assert_eq!(subject.pages[2].next, None);
    }

    #[test]
    fn advance_and_retreat_keep_exactly_one_current() {
        let mut subject = chain(2);
        subject.check_single_current().unwrap();

        assert!(subject.advance().unwrap().is_some());
        subject.check_single_current().unwrap();
        assert_eq!(subject.current_index(), Some(1));

        assert!(subject.retreat().unwrap().is_some());
        subject.check_single_current().unwrap();
        assert_eq!(subject.current_index(), Some(0));
    }

    #[test]
    fn traversal_is_soft_bounded() {
        let mut subject = chain(1);
        // At the head, retreat is a no-op
        assert!(subject.retreat().unwrap().is_none());
        assert_eq!(subject.current_index(), Some(0));

        // Walk to the tail, then advance is a no-op
        while subject.advance().unwrap().is_some() {}
        assert_eq!(subject.current_index(), Some(subject.pages.len() - 1));
        assert!(subject.advance().unwrap().is_none());
        subject.check_single_current().unwrap();
    }

    #[test]
    fn marker_only_chain_is_complete() {
        let subject = chain(3);
        assert!(subject.is_complete());
        for index in 0..subject.pages.len() {
            assert!(subject.pages[index].is_complete());
        }
    }

    #[test]
    fn effectively_first_and_last_use_neighbour_species() {
        let subject = chain(2);
        assert!(subject.is_effectively_first(0));
        assert!(subject.is_effectively_first(1)); // prev is a marker
        assert!(subject.is_effectively_last(1)); // next is the end marker
        assert!(subject.is_effectively_last(subject.pages.len() - 1));
    }
}
