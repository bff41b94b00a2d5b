//! Integration tests for the card set manager
//!
//! These tests drive the engine through its public facade against an
//! in-memory vault:
//! - Mode switches and stale load handling
//! - Incremental reconciliation of creates, deletes and renames
//! - Subscriber isolation and engine events
//! - The file store watcher and `auto_refresh`
//! - Options persistence and restore

mod common;

use common::{eventually, note, paths, Harness, MapSettings, MemoryFileStore};
use core_cards::{
    CardError, CardSet, CardSetMode, FileChange, SelectionConfig, SelectionOptions, SortDirection,
    SortField, SortOption, OPTIONS_SETTINGS_KEY,
};
use core_runtime::events::{CoreEvent, EngineEvent, Receiver, SelectionEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn by_name() -> SortOption {
    SortOption::new(SortField::FileName, SortDirection::Ascending)
}

fn notes_folder() -> SelectionOptions {
    SelectionOptions::for_mode(CardSetMode::FixedLocation)
        .with_source("/notes")
        .with_sort(by_name())
}

fn vault() -> MemoryFileStore {
    MemoryFileStore::with_files(&["/notes/a.md", "/notes/b.md", "/other/c.md"])
}

fn drain(events: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

// ============================================================================
// Mode Switching
// ============================================================================

#[tokio::test]
async fn test_fixed_location_end_to_end() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;

    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    let current = manager.get_current_card_set();
    assert_eq!(current.mode(), CardSetMode::FixedLocation);
    assert_eq!(current.source(), Some("/notes"));
    assert_eq!(paths(&current), vec!["/notes/a.md", "/notes/b.md"]);

    assert!(manager.add_file(note("/notes/d.md", 9)).await);
    assert_eq!(
        paths(&manager.get_current_card_set()),
        vec!["/notes/a.md", "/notes/b.md", "/notes/d.md"]
    );

    assert!(manager.remove_file("/notes/a.md").await);
    assert_eq!(
        paths(&manager.get_current_card_set()),
        vec!["/notes/b.md", "/notes/d.md"]
    );

    // Outside the folder: nothing to adopt
    assert!(!manager.add_file(note("/other/e.md", 10)).await);
    assert!(!manager.remove_file("/notes/missing.md").await);
    assert_eq!(manager.get_current_card_set().len(), 2);
}

#[tokio::test]
async fn test_same_mode_without_options_is_noop() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    let before = manager.get_current_card_set();
    let lists = harness.store.list_calls();

    manager.set_mode(CardSetMode::FixedLocation, None).await.unwrap();

    assert_eq!(harness.store.list_calls(), lists);
    assert_eq!(manager.get_current_card_set().id(), before.id());
}

#[tokio::test]
async fn test_mode_switch_discards_stale_load() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;

    harness.store.set_list_delay(Duration::from_millis(200));
    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .set_mode(
                    CardSetMode::WholeStore,
                    Some(SelectionOptions::for_mode(CardSetMode::WholeStore)),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.store.set_list_delay(Duration::ZERO);
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    slow.await.unwrap().unwrap();

    assert_eq!(manager.mode(), Some(CardSetMode::FixedLocation));
    let current = manager.get_current_card_set();
    assert_eq!(current.mode(), CardSetMode::FixedLocation);
    assert_eq!(paths(&current), vec!["/notes/a.md", "/notes/b.md"]);
}

#[tokio::test]
async fn test_delete_during_slow_refresh_survives_adoption() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    harness.store.set_list_delay(Duration::from_millis(200));
    let refresh = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .set_options(notes_folder().with_subdirectories(true))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.store.delete("/notes/a.md");
    assert!(manager.remove_file("/notes/a.md").await);
    assert_eq!(paths(&manager.get_current_card_set()), vec!["/notes/b.md"]);

    refresh.await.unwrap().unwrap();
    assert!(manager.options().include_subdirectories);
    assert_eq!(paths(&manager.get_current_card_set()), vec!["/notes/b.md"]);
}

#[tokio::test]
async fn test_delete_during_slow_mode_switch_is_replayed() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    harness.store.set_list_delay(Duration::from_millis(200));
    let switch = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .set_mode(
                    CardSetMode::WholeStore,
                    Some(SelectionOptions::for_mode(CardSetMode::WholeStore).with_sort(by_name())),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.store.delete("/notes/a.md");
    // Deferred to the running load
    assert!(!manager.remove_file("/notes/a.md").await);

    switch.await.unwrap().unwrap();
    let current = manager.get_current_card_set();
    assert_eq!(current.mode(), CardSetMode::WholeStore);
    assert_eq!(paths(&current), vec!["/notes/b.md", "/other/c.md"]);
}

#[tokio::test]
async fn test_focus_change_outside_active_location_mode_is_ignored() {
    let store = vault();
    store.focus(Some("/notes/a.md"));
    let harness = Harness::new(store);
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    let before = manager.get_current_card_set();

    harness.store.focus(Some("/other/c.md"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let current = manager.get_current_card_set();
    assert_eq!(current.id(), before.id());
    assert_eq!(current.mode(), CardSetMode::FixedLocation);
}

#[tokio::test]
async fn test_disabled_mode_is_rejected() {
    let harness = Harness::new(vault()).with_config(SelectionConfig {
        enabled_modes: vec![CardSetMode::ActiveLocation, CardSetMode::WholeStore],
        initial_backoff_ms: 1,
        ..SelectionConfig::default()
    });
    let manager = harness.start().await;

    let err = manager
        .set_mode(CardSetMode::QueryResult, None)
        .await
        .unwrap_err();
    assert_eq!(err, CardError::UnsupportedMode("query_result".to_string()));
    assert_eq!(manager.mode(), Some(CardSetMode::ActiveLocation));
    assert_eq!(
        manager.registry().get_registered_modes().await,
        vec![CardSetMode::ActiveLocation, CardSetMode::WholeStore]
    );
}

#[tokio::test]
async fn test_whole_store_and_query_modes() {
    let store = vault();
    store.insert(note("/other/rust.md", 4), "");
    store.insert(note("/notes/ownership.md", 5), "Borrowing in Rust");
    store.insert(note("/notes/image.png", 6), "rust");
    let harness = Harness::new(store);
    let manager = harness.start().await;

    manager
        .set_mode(
            CardSetMode::WholeStore,
            Some(SelectionOptions::for_mode(CardSetMode::WholeStore).with_sort(by_name())),
        )
        .await
        .unwrap();
    assert_eq!(manager.get_current_card_set().len(), 5);

    manager
        .set_mode(
            CardSetMode::QueryResult,
            Some(
                SelectionOptions::for_mode(CardSetMode::QueryResult)
                    .with_source("rust")
                    .with_sort(by_name()),
            ),
        )
        .await
        .unwrap();
    let current = manager.get_current_card_set();
    assert_eq!(current.source(), Some("rust"));
    assert_eq!(
        paths(&current),
        vec!["/notes/ownership.md", "/other/rust.md"]
    );
}

#[tokio::test]
async fn test_listing_failure_is_retried() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;

    harness.store.fail_next_lists(2);
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    assert_eq!(manager.get_current_card_set().len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_keep_previous_set() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    let mut events = manager.subscribe_events();

    harness.store.fail_next_lists(10);
    manager
        .set_options(notes_folder().with_subdirectories(true))
        .await
        .unwrap();

    assert_eq!(manager.get_current_card_set().len(), 2);
    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        CoreEvent::Selection(SelectionEvent::ProviderFailed { operation, .. })
            if operation == "refresh_card_set"
    )));
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_rename_across_folder_boundary() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    let moved_out = FileChange::Rename {
        file: note("/other/a.md", 7),
        old_path: "/notes/a.md".to_string(),
    };
    assert!(manager.handle_file_change(moved_out).await);
    assert_eq!(paths(&manager.get_current_card_set()), vec!["/notes/b.md"]);

    let moved_in = FileChange::Rename {
        file: note("/notes/c.md", 8),
        old_path: "/other/c.md".to_string(),
    };
    assert!(manager.handle_file_change(moved_in).await);
    assert_eq!(
        paths(&manager.get_current_card_set()),
        vec!["/notes/b.md", "/notes/c.md"]
    );
}

#[tokio::test]
async fn test_modify_replaces_entry() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    assert!(manager
        .handle_file_change(FileChange::Modify(note("/notes/a.md", 42)))
        .await);

    let current = manager.get_current_card_set();
    assert_eq!(current.len(), 2);
    assert_eq!(current.get("/notes/a.md").unwrap().modified_at, 42);
}

#[tokio::test]
async fn test_concurrent_changes_are_all_applied() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    let adds = (0..20).map(|idx| {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .add_file(note(&format!("/notes/n{idx:02}.md"), idx))
                .await
        })
    });
    for outcome in futures::future::join_all(adds).await {
        assert!(outcome.unwrap());
    }

    assert_eq!(manager.get_current_card_set().len(), 22);
}

#[tokio::test]
async fn test_changes_ignored_before_initialize() {
    let harness = Harness::new(vault());
    let manager = harness.build().await;

    assert!(!manager.add_file(note("/notes/d.md", 1)).await);
    assert!(manager.get_current_card_set().is_empty());
}

#[tokio::test]
async fn test_changes_while_other_mode_active_are_not_carried_back() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    manager
        .set_mode(
            CardSetMode::WholeStore,
            Some(SelectionOptions::for_mode(CardSetMode::WholeStore).with_sort(by_name())),
        )
        .await
        .unwrap();

    harness.store.insert(note("/notes/d.md", 9), "");
    assert!(manager.add_file(note("/notes/d.md", 9)).await);
    harness.store.delete("/notes/a.md");
    assert!(manager.remove_file("/notes/a.md").await);
    assert_eq!(
        paths(&manager.get_current_card_set()),
        vec!["/notes/b.md", "/other/c.md", "/notes/d.md"]
    );

    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    let current = manager.get_current_card_set();
    assert_eq!(current.mode(), CardSetMode::FixedLocation);
    assert_eq!(paths(&current), vec!["/notes/b.md", "/notes/d.md"]);
}

// ============================================================================
// Subscribers & Events
// ============================================================================

#[tokio::test]
async fn test_panicking_subscriber_is_isolated() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    let mut events = manager.subscribe_events();

    let delivered = Arc::new(Mutex::new(Vec::<CardSet>::new()));
    manager.subscribe_to_changes(Arc::new(|_: &CardSet| panic!("renderer crashed")));
    let sink = delivered.clone();
    let id = manager.subscribe_to_changes(Arc::new(move |cards: &CardSet| {
        sink.lock().unwrap().push(cards.clone());
    }));

    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    assert_eq!(delivered.lock().unwrap().len(), 1);
    assert_eq!(delivered.lock().unwrap()[0].len(), 2);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|event| matches!(
        event,
        CoreEvent::Selection(SelectionEvent::ModeChanged { to, .. }) if to == "fixed_location"
    )));
    assert!(seen.iter().any(|event| matches!(
        event,
        CoreEvent::Selection(SelectionEvent::ListenerFailed { .. })
    )));
    assert!(seen.iter().any(|event| matches!(
        event,
        CoreEvent::Selection(SelectionEvent::CardSetUpdated { entry_count: 2, .. })
    )));

    assert!(manager.unsubscribe_from_changes(id));
    manager.add_file(note("/notes/d.md", 5)).await;
    assert_eq!(delivered.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_set_sort_option_resorts_current_set() {
    let harness = Harness::new(vault());
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    manager.subscribe_to_changes(Arc::new(move |_: &CardSet| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let reversed = SortOption::new(SortField::FileName, SortDirection::Descending);
    manager.set_sort_option(reversed).await;

    assert_eq!(
        paths(&manager.get_current_card_set()),
        vec!["/notes/b.md", "/notes/a.md"]
    );
    assert_eq!(manager.options().sort_option, reversed);
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    // New entries follow the new order
    manager.add_file(note("/notes/c.md", 3)).await;
    assert_eq!(
        paths(&manager.get_current_card_set()),
        vec!["/notes/c.md", "/notes/b.md", "/notes/a.md"]
    );
}

// ============================================================================
// Watcher
// ============================================================================

#[tokio::test]
async fn test_watcher_forwards_store_events() {
    let harness = Harness::new(vault()).watching();
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();

    harness.store.create(note("/notes/d.md", 4));
    assert!(eventually(|| manager.get_current_card_set().contains("/notes/d.md")).await);

    harness.store.delete("/notes/a.md");
    assert!(eventually(|| !manager.get_current_card_set().contains("/notes/a.md")).await);
}

#[tokio::test]
async fn test_auto_refresh_off_ignores_store_events() {
    let harness = Harness::new(vault()).watching();
    let manager = harness.start().await;
    manager
        .set_mode(
            CardSetMode::FixedLocation,
            Some(notes_folder().with_auto_refresh(false)),
        )
        .await
        .unwrap();

    harness.store.create(note("/notes/d.md", 4));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!manager.get_current_card_set().contains("/notes/d.md"));

    // An explicit refresh still picks it up
    manager.refresh().await.unwrap();
    assert!(manager.get_current_card_set().contains("/notes/d.md"));
}

#[tokio::test]
async fn test_active_location_follows_focus() {
    let store = vault();
    store.focus(Some("/notes/a.md"));
    let harness = Harness::new(store);
    let manager = harness.start().await;

    let current = manager.get_current_card_set();
    assert_eq!(manager.mode(), Some(CardSetMode::ActiveLocation));
    assert_eq!(current.source(), Some("/notes"));
    assert_eq!(current.len(), 2);

    harness.store.focus(Some("/other/c.md"));
    assert!(eventually(|| manager.get_current_card_set().source() == Some("/other")).await);
    assert_eq!(
        paths(&manager.get_current_card_set()),
        vec!["/other/c.md"]
    );
}

// ============================================================================
// Persistence & Teardown
// ============================================================================

#[tokio::test]
async fn test_options_are_persisted_and_restored() {
    let settings = Arc::new(MapSettings::default());
    let harness = Harness::new(vault()).with_settings(settings.clone());

    let first = harness.start().await;
    first
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    first.destroy().await;
    assert!(settings.get(OPTIONS_SETTINGS_KEY).is_some());

    let second = harness.start().await;
    assert_eq!(second.mode(), Some(CardSetMode::FixedLocation));
    assert_eq!(second.options().source.as_deref(), Some("/notes"));
    assert_eq!(
        paths(&second.get_current_card_set()),
        vec!["/notes/a.md", "/notes/b.md"]
    );
}

#[tokio::test]
async fn test_malformed_persisted_options_fall_back_to_defaults() {
    let settings = Arc::new(MapSettings::default());
    settings.put(OPTIONS_SETTINGS_KEY, "{not json");
    let harness = Harness::new(vault()).with_settings(settings);

    let manager = harness.start().await;
    assert_eq!(manager.mode(), Some(CardSetMode::ActiveLocation));
}

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let harness = Harness::new(vault()).watching();
    let manager = harness.start().await;
    manager
        .set_mode(CardSetMode::FixedLocation, Some(notes_folder()))
        .await
        .unwrap();
    let mut events = manager.subscribe_events();

    manager.destroy().await;
    manager.destroy().await;

    assert!(manager.is_destroyed());
    assert!(manager.registry().get_registered_modes().await.is_empty());
    assert!(!manager.add_file(note("/notes/d.md", 4)).await);

    let stopped = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, CoreEvent::Engine(EngineEvent::Stopped)))
        .count();
    assert_eq!(stopped, 1);
}
