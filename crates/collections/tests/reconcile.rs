//! Reconciliation over a real rule-group evaluation against fake providers.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use culler_collections::{CollectionReconciler, ReconcileError, ReconcileOutcome};
use culler_core::providers::ArrMedia;
use culler_core::testing::{ArrCall, FakeProviders, FixedClock};
use culler_core::{
    AbortSignal, ArrAction, Collection, CollectionLog, CollectionLogType, DataType, Exclusion,
    LogMeta, MediaItem,
};
use culler_notify::{EventBus, EventType};
use culler_rules::schema::*;
use culler_rules::{GroupEvaluation, HandlerSettings, RuleGroupHandler};
use culler_storage::{MemoryStore, RecordStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn movie(id: &str, tmdb: i64, added_days_ago: i64) -> MediaItem {
    let mut m = MediaItem::new(id, "1", DataType::Movie, format!("Movie {}", id));
    m.added_at = Some(t0() - Duration::days(added_days_ago));
    m.guids.tmdb = Some(tmdb);
    m
}

/// One section, one rule: added in the last 30 days.
fn recent_group(data_type: DataType) -> RuleGroup {
    RuleGroup::new("Recently added", "1", data_type).with_rules(vec![RuleDefinition::literal(
        0,
        RuleProperty::Plex(PlexProperty::AddDate),
        Comparator::InLast,
        CustomValue::new(RuleType::Number, "30"),
    )])
}

struct Harness {
    fakes: FakeProviders,
    store: Arc<MemoryStore>,
    bus: EventBus,
    clock: Arc<FixedClock>,
    reconciler: CollectionReconciler,
    handler: RuleGroupHandler,
}

impl Harness {
    fn new(items: Vec<MediaItem>) -> Self {
        let fakes = FakeProviders::new(items);
        let store = Arc::new(MemoryStore::new());
        let clock = FixedClock::new(t0());
        let bus = EventBus::new(clock.clone());
        let reconciler =
            CollectionReconciler::new(fakes.providers(), store.clone(), bus.clone(), clock.clone());
        let handler =
            RuleGroupHandler::new(fakes.providers(), clock.clone(), HandlerSettings::default());
        Self {
            fakes,
            store,
            bus,
            clock,
            reconciler,
            handler,
        }
    }

    async fn link(&self, collection: Collection, mut group: RuleGroup) -> (Collection, RuleGroup) {
        let collection = self.store.save_collection(collection).await.unwrap();
        group.collection_id = Some(collection.id);
        let group = self.store.save_rule_group(group).await.unwrap();
        (collection, group)
    }

    async fn collection(&self, id: i64) -> Collection {
        self.store.collection(id).await.unwrap().unwrap()
    }

    async fn run(&self, group: &RuleGroup) -> ReconcileOutcome {
        let collection = self.collection(group.collection_id.unwrap()).await;
        let exclusions = self.store.exclusions_for_group(group.id).await.unwrap();
        let evaluation = self
            .handler
            .evaluate(group, Some(&collection), &exclusions, &AbortSignal::new(), |_| {})
            .await
            .unwrap()
            .unwrap();
        self.reconciler.reconcile(group, &evaluation).await.unwrap()
    }

    async fn member_ids(&self, collection_id: i64) -> Vec<String> {
        self.store
            .collection_media(collection_id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.media_id)
            .collect()
    }

    async fn media_logs(&self, collection_id: i64) -> Vec<CollectionLog> {
        self.store
            .logs(collection_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|l| l.log_type == CollectionLogType::Media)
            .collect()
    }
}

fn collection(days: Option<u32>, action: ArrAction) -> Collection {
    let mut c = Collection::new("Leaving soon", "1", DataType::Movie);
    c.delete_after_days = days;
    c.arr_action = action;
    c.visible_on_home = true;
    c
}

#[tokio::test]
async fn added_then_handled_after_retention() {
    let h = Harness::new(vec![movie("a", 101, 5), movie("b", 102, 60)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    let (c, g) = h
        .link(collection(Some(10), ArrAction::Delete), recent_group(DataType::Movie))
        .await;
    let mut events = h.bus.subscribe();

    let first = h.run(&g).await;
    assert_eq!(first.added, vec!["a".to_string()]);
    assert!(first.removed.is_empty() && first.handled.is_empty());

    let members = h.store.collection_media(c.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].add_date, t0());
    assert_eq!(members[0].tmdb_id, Some(101));
    assert!(!members[0].is_manual);

    let external = h.collection(c.id).await.plex_id.expect("external collection created");
    assert_eq!(h.fakes.media_server.collection_members(&external), vec!["a".to_string()]);
    assert_eq!(h.fakes.media_server.visibility(&external), Some((true, false)));

    h.clock.advance(Duration::days(11));
    let second = h.run(&g).await;
    assert_eq!(second.handled, vec!["a".to_string()]);
    assert!(second.added.is_empty());

    let calls = h.fakes.radarr.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], ArrCall::Delete(t) if t.tmdb_id == Some(101)));
    assert!(h.member_ids(c.id).await.is_empty());

    let stored = h.collection(c.id).await;
    assert_eq!(stored.handled_media_amount, 1);
    assert_eq!(stored.plex_id, None);
    assert!(!h.fakes.media_server.collection_exists(&external));

    let kinds: Vec<EventType> = events
        .drain()
        .into_iter()
        .filter(|e| e.payload.media_change().is_some())
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        kinds,
        vec![EventType::CollectionMediaAdded, EventType::CollectionMediaHandled]
    );
}

#[tokio::test]
async fn unmatched_member_removed_without_arr_action() {
    let h = Harness::new(vec![movie("a", 101, 25)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    let (c, g) = h
        .link(collection(Some(30), ArrAction::Delete), recent_group(DataType::Movie))
        .await;

    assert_eq!(h.run(&g).await.added, vec!["a".to_string()]);

    h.clock.advance(Duration::days(11));
    let outcome = h.run(&g).await;
    assert_eq!(outcome.removed, vec!["a".to_string()]);
    assert!(outcome.handled.is_empty());
    assert!(h.fakes.radarr.calls().is_empty());

    let last = h.media_logs(c.id).await.pop().unwrap();
    assert_eq!(
        last.meta,
        Some(LogMeta::RuleUnmatched {
            rule_group_id: g.id,
            rule_group_name: g.name.clone(),
        })
    );
}

#[tokio::test]
async fn retention_window_boundary() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    let (_, g) = h
        .link(collection(Some(5), ArrAction::Delete), recent_group(DataType::Movie))
        .await;
    h.run(&g).await;

    h.clock.set(t0() + Duration::days(4) + Duration::hours(23));
    let early = h.run(&g).await;
    assert!(early.handled.is_empty());
    assert!(h.fakes.radarr.calls().is_empty());

    h.clock.set(t0() + Duration::days(5));
    let due = h.run(&g).await;
    assert_eq!(due.handled, vec!["a".to_string()]);
    assert_eq!(h.fakes.radarr.calls().len(), 1);
    // Handled items are not re-added within the same pass.
    assert!(due.added.is_empty());
}

#[tokio::test]
async fn second_pass_is_a_noop() {
    let h = Harness::new(vec![movie("a", 101, 1), movie("b", 102, 2), movie("old", 103, 90)]);
    let (c, g) = h
        .link(collection(Some(30), ArrAction::Delete), recent_group(DataType::Movie))
        .await;

    let first = h.run(&g).await;
    assert_eq!(first.added.len(), 2);
    let logs_after_first = h.store.logs(c.id).await.unwrap().len();

    let second = h.run(&g).await;
    assert!(second.is_noop(), "{second:?}");
    assert_eq!(h.member_ids(c.id).await.len(), 2);
    assert_eq!(h.store.logs(c.id).await.unwrap().len(), logs_after_first);
    assert_eq!(h.collection(c.id).await.handled_media_amount, 0);
}

#[tokio::test]
async fn handled_item_is_not_readded_while_it_matches() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    let (c, g) = h
        .link(collection(None, ArrAction::Unmonitor), recent_group(DataType::Movie))
        .await;

    let first = h.run(&g).await;
    assert_eq!(first.added, vec!["a".to_string()]);
    assert_eq!(first.handled, vec!["a".to_string()]);
    assert!(h.member_ids(c.id).await.is_empty());
    let logs_after_first = h.store.logs(c.id).await.unwrap().len();

    for _ in 0..3 {
        let outcome = h.run(&g).await;
        assert!(outcome.is_noop(), "{outcome:?}");
    }
    assert_eq!(h.fakes.radarr.calls().len(), 1);
    assert!(h.member_ids(c.id).await.is_empty());
    assert_eq!(h.store.logs(c.id).await.unwrap().len(), logs_after_first);
    assert_eq!(h.collection(c.id).await.handled_media_amount, 1);

    let markers = h.store.handled_media(c.id).await.unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].media_id, "a");
    assert_eq!(markers[0].action, ArrAction::Unmonitor);
}

#[tokio::test]
async fn handled_item_rejoins_after_it_stops_matching() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    let (c, g) = h
        .link(collection(Some(5), ArrAction::Unmonitor), recent_group(DataType::Movie))
        .await;
    h.run(&g).await;

    h.clock.advance(Duration::days(5));
    assert_eq!(h.run(&g).await.handled, vec!["a".to_string()]);
    assert!(h.run(&g).await.is_noop());

    // Older than 30 days: the marker goes with the match.
    h.clock.advance(Duration::days(30));
    assert!(h.run(&g).await.is_noop());
    assert!(h.store.handled_media(c.id).await.unwrap().is_empty());

    // Re-added to the library and matching again.
    let mut again = movie("a", 101, 1);
    again.added_at = Some(t0() + Duration::days(34));
    h.fakes.media_server.set_items(vec![again]);
    assert_eq!(h.run(&g).await.added, vec!["a".to_string()]);
    assert_eq!(h.fakes.radarr.calls().len(), 1);
}

#[tokio::test]
async fn manual_add_clears_handled_marker() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    let (c, g) = h
        .link(collection(None, ArrAction::DoNothing), recent_group(DataType::Movie))
        .await;
    h.run(&g).await;
    assert_eq!(h.store.handled_media(c.id).await.unwrap().len(), 1);

    h.reconciler.add_manual(c.id, "a").await.unwrap();
    assert!(h.store.handled_media(c.id).await.unwrap().is_empty());
    assert_eq!(h.member_ids(c.id).await, vec!["a".to_string()]);
}

#[tokio::test]
async fn pruning_forgets_markers_of_vanished_media() {
    let h = Harness::new(vec![movie("a", 101, 1), movie("b", 102, 1)]);
    let (c, g) = h
        .link(collection(None, ArrAction::DoNothing), recent_group(DataType::Movie))
        .await;
    h.run(&g).await;
    assert_eq!(h.store.handled_media(c.id).await.unwrap().len(), 2);

    h.fakes.media_server.remove_item("a");
    assert!(h.reconciler.prune_missing(c.id).await.unwrap().is_empty());
    let left: Vec<String> = h
        .store
        .handled_media(c.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.media_id)
        .collect();
    assert_eq!(left, vec!["b".to_string()]);
}

#[tokio::test]
async fn excluded_items_never_join() {
    let h = Harness::new(vec![movie("a", 101, 1), movie("b", 102, 1)]);
    let (c, g) = h
        .link(collection(Some(30), ArrAction::Delete), recent_group(DataType::Movie))
        .await;
    h.reconciler.exclude("a", Some(g.id)).await.unwrap();

    let outcome = h.run(&g).await;
    assert_eq!(outcome.added, vec!["b".to_string()]);
    assert_eq!(h.member_ids(c.id).await, vec!["b".to_string()]);
}

#[tokio::test]
async fn newly_excluded_member_leaves_without_arr_action() {
    let h = Harness::new(vec![movie("b", 102, 1)]);
    h.fakes.radarr.insert(102, ArrMedia::default());
    let (c, g) = h
        .link(collection(Some(30), ArrAction::Delete), recent_group(DataType::Movie))
        .await;
    assert_eq!(h.run(&g).await.added, vec!["b".to_string()]);

    // Library-wide exclusion.
    h.store
        .save_exclusion(Exclusion {
            id: 0,
            media_id: "b".into(),
            rule_group_id: None,
            parent: None,
            data_type: Some(DataType::Movie),
        })
        .await
        .unwrap();

    let outcome = h.run(&g).await;
    assert_eq!(outcome.removed, vec!["b".to_string()]);
    assert!(outcome.handled.is_empty());
    assert!(h.fakes.radarr.calls().is_empty());
    let last = h.media_logs(c.id).await.pop().unwrap();
    assert_eq!(last.meta, Some(LogMeta::Excluded { rule_group_id: g.id }));
}

#[tokio::test]
async fn manual_members_survive_reconciliation() {
    let h = Harness::new(vec![movie("old", 103, 90)]);
    let (c, g) = h
        .link(collection(Some(30), ArrAction::Delete), recent_group(DataType::Movie))
        .await;

    let member = h.reconciler.add_manual(c.id, "old").await.unwrap();
    assert!(member.is_manual);
    assert!(matches!(
        h.reconciler.add_manual(c.id, "old").await,
        Err(ReconcileError::AlreadyMember { .. })
    ));

    let outcome = h.run(&g).await;
    assert!(outcome.is_noop());
    assert_eq!(h.member_ids(c.id).await, vec!["old".to_string()]);

    let external = h.collection(c.id).await.plex_id.unwrap();
    assert!(h.reconciler.remove_manual(c.id, "old").await.unwrap());
    assert!(!h.reconciler.remove_manual(c.id, "old").await.unwrap());
    assert!(!h.fakes.media_server.collection_exists(&external));
    assert_eq!(
        h.media_logs(c.id).await.pop().unwrap().meta,
        Some(LogMeta::Manual { added: false })
    );
}

#[tokio::test]
async fn manual_add_rejects_other_media_types() {
    let show = MediaItem::new("s1", "1", DataType::Show, "Lost");
    let h = Harness::new(vec![show]);
    let c = h
        .store
        .save_collection(collection(None, ArrAction::Delete))
        .await
        .unwrap();
    assert!(matches!(
        h.reconciler.add_manual(c.id, "s1").await,
        Err(ReconcileError::Incompatible(_))
    ));
    assert!(matches!(
        h.reconciler.add_manual(c.id, "nope").await,
        Err(ReconcileError::MediaNotFound(_))
    ));
}

#[tokio::test]
async fn untracked_media_is_deleted_through_media_server() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    let (_, g) = h
        .link(collection(None, ArrAction::Delete), recent_group(DataType::Movie))
        .await;

    let outcome = h.run(&g).await;
    assert_eq!(outcome.added, vec!["a".to_string()]);
    assert_eq!(outcome.handled, vec!["a".to_string()]);
    assert_eq!(h.fakes.media_server.deleted_media(), vec!["a".to_string()]);
    assert!(h.fakes.radarr.calls().is_empty());
}

#[tokio::test]
async fn do_nothing_still_counts_as_handled() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    let (c, g) = h
        .link(collection(None, ArrAction::DoNothing), recent_group(DataType::Movie))
        .await;

    let outcome = h.run(&g).await;
    assert_eq!(outcome.handled, vec!["a".to_string()]);
    assert!(h.fakes.radarr.calls().is_empty());
    assert!(h.fakes.media_server.deleted_media().is_empty());
    assert_eq!(h.collection(c.id).await.handled_media_amount, 1);
}

#[tokio::test]
async fn force_overseerr_clears_request_entry() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    let mut c = collection(None, ArrAction::UnmonitorDeleteAll);
    c.force_overseerr = true;
    let (_, g) = h.link(c, recent_group(DataType::Movie)).await;
    h.run(&g).await;
    h.run(&g).await;

    assert!(matches!(
        h.fakes.radarr.calls().as_slice(),
        [ArrCall::Unmonitor { delete_files: true, .. }]
    ));
    let cleared = h.fakes.overseerr.deleted_media();
    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0].tmdb_id, Some(101));
}

#[tokio::test]
async fn shows_unmonitor_existing_seasons() {
    let mut show = MediaItem::new("s1", "1", DataType::Show, "Lost");
    show.added_at = Some(t0() - Duration::days(2));
    show.guids.tvdb = Some(73739);
    let h = Harness::new(vec![show]);
    h.fakes.sonarr.insert(73739, ArrMedia::default());

    let mut c = Collection::new("Shows", "1", DataType::Show);
    c.arr_action = ArrAction::UnmonitorDeleteExisting;
    let (_, g) = h.link(c, recent_group(DataType::Show)).await;
    h.run(&g).await;
    h.run(&g).await;

    assert!(matches!(
        h.fakes.sonarr.calls().as_slice(),
        [ArrCall::UnmonitorExistingSeasons(t)] if t.tvdb_id == Some(73739)
    ));
}

#[tokio::test]
async fn vanished_media_is_left_to_pruning() {
    let h = Harness::new(vec![movie("a", 101, 1), movie("b", 102, 1)]);
    let (c, g) = h
        .link(collection(Some(30), ArrAction::Delete), recent_group(DataType::Movie))
        .await;
    h.run(&g).await;

    h.fakes.media_server.remove_item("a");
    let outcome = h.run(&g).await;
    assert!(outcome.is_noop());
    assert_eq!(h.member_ids(c.id).await.len(), 2);

    let pruned = h.reconciler.prune_missing(c.id).await.unwrap();
    assert_eq!(pruned, vec!["a".to_string()]);
    assert_eq!(h.member_ids(c.id).await, vec!["b".to_string()]);
    assert_eq!(
        h.media_logs(c.id).await.pop().unwrap().meta,
        Some(LogMeta::Missing)
    );
}

#[tokio::test]
async fn aborted_evaluations_change_nothing() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    let (c, g) = h
        .link(collection(None, ArrAction::Delete), recent_group(DataType::Movie))
        .await;
    let evaluation = GroupEvaluation {
        rule_group_id: g.id,
        matched: vec![movie("a", 101, 1)],
        aborted: true,
        ..Default::default()
    };
    let outcome = h.reconciler.reconcile(&g, &evaluation).await.unwrap();
    assert!(outcome.is_noop());
    assert!(h.member_ids(c.id).await.is_empty());
}

#[tokio::test]
async fn collection_handler_pass_skips_excluded_members() {
    let h = Harness::new(vec![movie("a", 101, 1), movie("b", 102, 1)]);
    h.fakes.radarr.insert(101, ArrMedia::default());
    h.fakes.radarr.insert(102, ArrMedia::default());
    let (c, g) = h
        .link(collection(Some(3), ArrAction::Delete), recent_group(DataType::Movie))
        .await;
    h.run(&g).await;
    h.reconciler.exclude("b", None).await.unwrap();

    h.clock.advance(Duration::days(3));
    let outcome = h.reconciler.handle_collection(c.id).await.unwrap();
    assert_eq!(outcome.handled, vec!["a".to_string()]);
    assert_eq!(h.fakes.radarr.calls().len(), 1);
    assert_eq!(h.member_ids(c.id).await, vec!["b".to_string()]);
}

#[tokio::test]
async fn logs_and_exclusions_are_pruned() {
    let h = Harness::new(vec![movie("a", 101, 1)]);
    let mut c = collection(None, ArrAction::Delete);
    c.keep_logs_for_months = 1;
    let c = h.store.save_collection(c).await.unwrap();
    for age in [90, 10] {
        h.store
            .append_log(CollectionLog {
                id: 0,
                collection_id: c.id,
                timestamp: t0() - Duration::days(age),
                message: "entry".into(),
                log_type: CollectionLogType::Collection,
                meta: None,
            })
            .await
            .unwrap();
    }
    assert_eq!(h.reconciler.prune_logs(c.id).await.unwrap(), 1);
    assert_eq!(h.store.logs(c.id).await.unwrap().len(), 1);

    h.reconciler.exclude("a", None).await.unwrap();
    h.store
        .save_exclusion(Exclusion {
            id: 0,
            media_id: "ghost".into(),
            rule_group_id: None,
            parent: None,
            data_type: None,
        })
        .await
        .unwrap();
    assert_eq!(h.reconciler.sweep_exclusions().await.unwrap(), 1);
    let left: Vec<String> = h
        .store
        .exclusions()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.media_id)
        .collect();
    assert_eq!(left, vec!["a".to_string()]);
}
