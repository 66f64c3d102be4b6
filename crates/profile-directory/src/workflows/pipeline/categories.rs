use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::domain::{Category, ListingId};
use super::tiers::TierError;

/// Errors raised by the listing/category join relation.
#[derive(Debug, thiserror::Error)]
pub enum CategoryError {
    #[error("category '{0}' not found")]
    NotFound(String),
    #[error("listing '{listing_id}' cannot reference unknown category '{category_id}'")]
    UnknownReference {
        listing_id: String,
        category_id: String,
    },
    #[error("category '{category_id}' is referenced by {listings} listing(s)")]
    InUse {
        category_id: String,
        listings: usize,
    },
    #[error(transparent)]
    Store(#[from] TierError),
}

/// Join relation between listings and categories.
#[async_trait]
pub trait CategoryLinks: Send + Sync {
    async fn upsert_category(&self, category: &Category) -> Result<(), CategoryError>;

    async fn link_listing(
        &self,
        listing_id: &ListingId,
        category_ids: &[String],
    ) -> Result<(), CategoryError>;

    async fn linked_categories(&self, listing_id: &ListingId)
        -> Result<Vec<String>, CategoryError>;

    async fn unlink_listing(&self, listing_id: &ListingId) -> Result<(), CategoryError>;

    /// Fails with [`CategoryError::InUse`] while any listing references the category.
    async fn delete_category(&self, category_id: &str) -> Result<(), CategoryError>;
}

#[derive(Debug, Default)]
struct LinkState {
    categories: BTreeMap<String, Category>,
    links: BTreeMap<ListingId, BTreeSet<String>>,
}

/// In-process join relation used when no primary store is configured.
#[derive(Debug, Default)]
pub struct MemoryCategoryLinks {
    state: RwLock<LinkState>,
}

#[async_trait]
impl CategoryLinks for MemoryCategoryLinks {
    async fn upsert_category(&self, category: &Category) -> Result<(), CategoryError> {
        let mut state = self.state.write().await;
        state
            .categories
            .insert(category.id.clone(), category.clone());
        Ok(())
    }

    async fn link_listing(
        &self,
        listing_id: &ListingId,
        category_ids: &[String],
    ) -> Result<(), CategoryError> {
        let mut state = self.state.write().await;
        if let Some(unknown) = category_ids
            .iter()
            .find(|id| !state.categories.contains_key(*id))
        {
            return Err(CategoryError::UnknownReference {
                listing_id: listing_id.0.clone(),
                category_id: unknown.clone(),
            });
        }

        state
            .links
            .entry(listing_id.clone())
            .or_default()
            .extend(category_ids.iter().cloned());
        Ok(())
    }

    async fn linked_categories(
        &self,
        listing_id: &ListingId,
    ) -> Result<Vec<String>, CategoryError> {
        let state = self.state.read().await;
        Ok(state
            .links
            .get(listing_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn unlink_listing(&self, listing_id: &ListingId) -> Result<(), CategoryError> {
        self.state.write().await.links.remove(listing_id);
        Ok(())
    }

    async fn delete_category(&self, category_id: &str) -> Result<(), CategoryError> {
        let mut state = self.state.write().await;
        let listings = state
            .links
            .values()
            .filter(|ids| ids.contains(category_id))
            .count();
        if listings > 0 {
            return Err(CategoryError::InUse {
                category_id: category_id.to_string(),
                listings,
            });
        }

        state
            .categories
            .remove(category_id)
            .map(|_| ())
            .ok_or_else(|| CategoryError::NotFound(category_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: &str) -> Category {
        Category {
            id: id.to_string(),
            name: id.to_uppercase(),
            slug: id.to_string(),
        }
    }

    #[tokio::test]
    async fn delete_is_refused_while_referenced() {
        let links = MemoryCategoryLinks::default();
        links.upsert_category(&category("finance")).await.unwrap();
        let listing = ListingId("lst-1".to_string());
        links
            .link_listing(&listing, &["finance".to_string()])
            .await
            .unwrap();

        assert!(matches!(
            links.delete_category("finance").await,
            Err(CategoryError::InUse { listings: 1, .. })
        ));

        links.unlink_listing(&listing).await.unwrap();
        links.delete_category("finance").await.unwrap();
        assert!(matches!(
            links.delete_category("finance").await,
            Err(CategoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_categories_are_rejected() {
        let links = MemoryCategoryLinks::default();
        let outcome = links
            .link_listing(&ListingId("lst-1".to_string()), &["ghost".to_string()])
            .await;
        assert!(matches!(
            outcome,
            Err(CategoryError::UnknownReference { .. })
        ));
    }
}
