//! Member and media lookups.
//!
//! The circulation core only needs to resolve members and media by id and
//! to flip a few fields on them (borrowed flag, fine balance). Registration,
//! authentication and catalog search live elsewhere; these traits are the
//! seam. The in-memory implementations back the binary and the tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::loans::types::{Media, Member};

/// Read access to members plus the fine-balance side effect of returns.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find_member(&self, member_id: &str) -> Option<Member>;

    async fn all_members(&self) -> Vec<Member>;

    /// Add `amount` to the member's running balance. `false` if unknown.
    async fn add_fine(&self, member_id: &str, amount: f64) -> bool;
}

/// Read access to media plus the borrowed-flag side effects of loans.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn find_media(&self, media_id: &str) -> Option<Media>;

    /// Flag the item borrowed until `due_date`. `false` if unknown.
    async fn mark_borrowed(&self, media_id: &str, due_date: NaiveDate) -> bool;

    /// Flag the item available again. `false` if unknown.
    async fn mark_available(&self, media_id: &str) -> bool;
}

/// `MemberDirectory` over a plain list.
#[derive(Debug, Default)]
pub struct InMemoryMembers {
    members: RwLock<Vec<Member>>,
}

impl InMemoryMembers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            members: RwLock::new(members.into_iter().collect()),
        }
    }

    /// Insert or replace by id.
    pub async fn upsert(&self, member: Member) {
        let mut members = self.members.write().await;
        match members.iter_mut().find(|m| m.id == member.id) {
            Some(existing) => *existing = member,
            None => members.push(member),
        }
    }
}

#[async_trait]
impl MemberDirectory for InMemoryMembers {
    async fn find_member(&self, member_id: &str) -> Option<Member> {
        self.members.read().await.iter().find(|m| m.id == member_id).cloned()
    }

    async fn all_members(&self) -> Vec<Member> {
        self.members.read().await.clone()
    }

    async fn add_fine(&self, member_id: &str, amount: f64) -> bool {
        let mut members = self.members.write().await;
        match members.iter_mut().find(|m| m.id == member_id) {
            Some(member) => {
                member.add_fine(amount);
                true
            }
            None => false,
        }
    }
}

/// `MediaCatalog` over a plain list.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<Vec<Media>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Media>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().collect()),
        }
    }

    /// Insert or replace by id.
    pub async fn upsert(&self, media: Media) {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|m| m.id == media.id) {
            Some(existing) => *existing = media,
            None => items.push(media),
        }
    }
}

#[async_trait]
impl MediaCatalog for InMemoryCatalog {
    async fn find_media(&self, media_id: &str) -> Option<Media> {
        self.items.read().await.iter().find(|m| m.id == media_id).cloned()
    }

    async fn mark_borrowed(&self, media_id: &str, due_date: NaiveDate) -> bool {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|m| m.id == media_id) {
            Some(media) => {
                media.borrow_until(due_date);
                true
            }
            None => false,
        }
    }

    async fn mark_available(&self, media_id: &str) -> bool {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|m| m.id == media_id) {
            Some(media) => {
                media.mark_returned();
                true
            }
            None => false,
        }
    }
}
