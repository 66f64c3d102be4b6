use std::sync::Arc;

use super::common::*;
use crate::workflows::pipeline::domain::Listing;
use crate::workflows::pipeline::reconciler::{ReconcileError, Reconciler};
use crate::workflows::pipeline::seed::seed_listings;
use crate::workflows::pipeline::tiers::{
    MemoryTable, PrimaryStore, TierAccessor, TierPolicy, TierStore,
};

async fn primary_accessor(
    cache: MemoryTable<Listing>,
    seed: Vec<Listing>,
) -> (Arc<TierAccessor<Listing>>, Arc<PrimaryStore>) {
    let store = Arc::new(PrimaryStore::in_memory().await.expect("in-memory store"));
    let accessor = TierAccessor::new(Arc::new(cache), TierPolicy::degrade())
        .with_primary(store.clone() as Arc<dyn TierStore<Listing>>)
        .with_seed(seed);
    (Arc::new(accessor), store)
}

async fn listing_count(store: &PrimaryStore) -> usize {
    TierStore::<Listing>::count(store).await.expect("count")
}

#[tokio::test]
async fn empty_primary_is_populated_from_seed() {
    let (accessor, store) = primary_accessor(MemoryTable::new(), seed_listings()).await;
    let report = Reconciler::new(accessor)
        .reconcile()
        .await
        .expect("reconciled");

    assert_eq!(report.before.count, 0);
    assert_eq!(report.after.count, 8);
    assert!(report
        .actions
        .iter()
        .any(|action| action.contains("populated empty store")));
    assert!(report
        .actions
        .iter()
        .any(|action| action == "cleared in-process cache"));
    assert_eq!(listing_count(&store).await, 8);
}

#[tokio::test]
async fn reconcile_is_additive_and_repeatable() {
    let (accessor, _store) = primary_accessor(MemoryTable::new(), seed_listings()).await;
    let reconciler = Reconciler::new(accessor);

    let first = reconciler.reconcile().await.expect("first run");
    let second = reconciler.reconcile().await.expect("second run");

    assert!(second.after.count >= first.after.count);
    assert_eq!(second.before.count, 8);
    assert!(second
        .actions
        .iter()
        .any(|action| action.ends_with("no action")));
}

#[tokio::test]
async fn administrator_edits_survive_repair() {
    let seed = seed_listings();
    let (accessor, store) = primary_accessor(MemoryTable::new(), seed.clone()).await;
    let reconciler = Reconciler::new(accessor);
    reconciler.reconcile().await.expect("initial population");

    let mut edited = seed[0].clone();
    edited.profile.company = "Renamed Partners".to_string();
    TierStore::<Listing>::upsert(store.as_ref(), &edited)
        .await
        .expect("admin edit");
    TierStore::<Listing>::delete(store.as_ref(), &seed[1].id.0)
        .await
        .expect("admin delete");

    let report = reconciler.reconcile().await.expect("repair");
    assert_eq!(report.before.count, 7);
    assert_eq!(report.after.count, 8);
    assert!(report
        .actions
        .iter()
        .any(|action| action.contains("topped up under-populated store")));

    let kept = TierStore::<Listing>::read_one(store.as_ref(), &seed[0].id.0)
        .await
        .expect("read")
        .expect("present");
    assert_eq!(kept.profile.company, "Renamed Partners");
}

#[tokio::test]
async fn cache_contents_are_preferred_over_seed() {
    let cache = MemoryTable::<Listing>::new();
    let cached = vec![listing("lst-c1", "cached-one"), listing("lst-c2", "cached-two")];
    cache.write_all(&cached).await.expect("warm cache");

    let (accessor, store) = primary_accessor(cache, seed_listings()).await;
    let report = Reconciler::new(accessor.clone())
        .reconcile()
        .await
        .expect("reconciled");

    assert_eq!(report.after.count, 2);
    assert!(report
        .actions
        .iter()
        .any(|action| action.contains("from in-process cache")));
    assert!(TierStore::<Listing>::read_one(store.as_ref(), "lst-c1")
        .await
        .expect("read")
        .is_some());
    assert_eq!(accessor.cache().snapshot().await, None);
}

#[tokio::test]
async fn threshold_override_controls_repair() {
    let (accessor, _store) = primary_accessor(MemoryTable::new(), seed_listings()).await;
    let report = Reconciler::new(accessor)
        .with_threshold(Some(0))
        .reconcile()
        .await
        .expect("reconciled");
    assert_eq!(report.after.count, 0);
    assert!(report
        .actions
        .iter()
        .any(|action| action.ends_with("no action")));
}

#[tokio::test]
async fn missing_primary_cannot_be_reconciled() {
    let accessor = Arc::new(memory_accessor(seed_listings()));
    assert!(matches!(
        Reconciler::new(accessor).reconcile().await,
        Err(ReconcileError::PrimaryNotConfigured)
    ));
}
