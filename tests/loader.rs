mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use aria::config::MusicConfig;
use aria::database::DaoManager;
use aria::error::BackendError;
use aria::music::{
    AudioLoader, BatchProgress, BatchStart, ExternalTrack, LoadMode, LoadResult, NextSongPosition, PlayOutcome,
    Playlist, QueuedTrack, RequestContext, SearchSource, TrackUserData,
};
use common::{ScriptedBackend, TestDb, test_db, track};

struct Harness {
    _db: TestDb,
    daos: DaoManager,
    primary: Arc<ScriptedBackend>,
    fallback: Arc<ScriptedBackend>,
    loader: AudioLoader,
}

fn music_config() -> MusicConfig {
    MusicConfig {
        queue_limit: 3,
        premium_queue_limit: 10,
        playlist_limit: 5,
        search_timeout: Duration::from_millis(100),
        ..Default::default()
    }
}

async fn harness(primary: ScriptedBackend, fallback: ScriptedBackend, config: MusicConfig) -> Harness {
    let db = test_db().await;
    let daos = db.daos().await;
    let primary = Arc::new(primary);
    let fallback = Arc::new(fallback);
    let players = Arc::new(aria::music::MusicPlayerManager::new(config.search_menu_ttl));
    let loader = AudioLoader::new(
        players,
        daos.song_cache.clone(),
        daos.premium_guilds.clone(),
        primary.clone(),
        fallback.clone(),
        config,
    );
    Harness {
        _db: db,
        daos,
        primary,
        fallback,
        loader,
    }
}

fn ctx(user_id: u64) -> RequestContext {
    RequestContext {
        guild_id: 1,
        channel_id: 2,
        user_id,
        user_tag: format!("user#{user_id}"),
    }
}

fn fill_queue(loader: &AudioLoader, count: usize) {
    let player = loader.players().get_or_create(1);
    for i in 0..count {
        player.queue.queue(
            QueuedTrack::new(
                track(&format!("filler {i}"), 1_000),
                TrackUserData {
                    requester_id: 0,
                    requester_tag: String::new(),
                },
            ),
            NextSongPosition::Bottom,
        );
    }
}

#[tokio::test]
async fn test_full_queue_rejects_before_any_search() {
    let h = harness(
        ScriptedBackend::new("primary").searching(Ok(vec![track("x", 1)])),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;
    fill_queue(&h.loader, 3);

    let outcome = h.loader.load(&ctx(5), "some song", LoadMode::First, NextSongPosition::Bottom).await;

    assert_eq!(outcome, PlayOutcome::QueueFull { limit: 3 });
    assert_eq!(h.primary.network_calls(), 0);
    assert_eq!(h.fallback.network_calls(), 0);
}

#[tokio::test]
async fn test_premium_guild_gets_larger_queue() {
    let h = harness(
        ScriptedBackend::new("primary").searching(Ok(vec![track("x", 1)])),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;
    fill_queue(&h.loader, 3);
    h.daos.premium_guilds.set_premium(1, true).await.unwrap();

    let outcome = h.loader.load(&ctx(5), "some song", LoadMode::First, NextSongPosition::Bottom).await;
    assert!(matches!(outcome, PlayOutcome::Queued { position: 4, .. }));
}

#[tokio::test]
async fn test_empty_primary_result_falls_back() {
    let h = harness(
        ScriptedBackend::new("primary"),
        ScriptedBackend::new("fallback").resolving(Ok(LoadResult::Track(track("Found", 180_000)))),
        music_config(),
    )
    .await;

    let outcome = h.loader.load(&ctx(5), "some song", LoadMode::First, NextSongPosition::Bottom).await;

    assert_eq!(
        outcome,
        PlayOutcome::Queued {
            track: track("Found", 180_000),
            position: 1
        }
    );
    assert_eq!(h.primary.calls(), vec!["search:YouTube:some song"]);
    assert_eq!(h.fallback.calls(), vec!["resolve:ytsearch:some song"]);
}

#[tokio::test]
async fn test_nothing_anywhere_is_no_matches() {
    let h = harness(
        ScriptedBackend::new("primary"),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;

    let outcome = h.loader.load(&ctx(5), "sc:obscure", LoadMode::First, NextSongPosition::Bottom).await;

    assert_eq!(outcome, PlayOutcome::NoMatches);
    assert_eq!(h.fallback.calls(), vec!["resolve:scsearch:obscure"]);
}

#[tokio::test]
async fn test_primary_errors_and_timeouts_fall_back() {
    let h = harness(
        ScriptedBackend::new("primary").searching(Err(BackendError::Unavailable("down".into()))),
        ScriptedBackend::new("fallback").resolving(Ok(LoadResult::Track(track("Found", 1)))),
        music_config(),
    )
    .await;
    let outcome = h.loader.load(&ctx(5), "a", LoadMode::First, NextSongPosition::Bottom).await;
    assert!(matches!(outcome, PlayOutcome::Queued { .. }));

    let h = harness(
        ScriptedBackend::new("primary")
            .searching(Ok(vec![track("late", 1)]))
            .slow(Duration::from_millis(500)),
        ScriptedBackend::new("fallback").resolving(Ok(LoadResult::Track(track("Found", 1)))),
        music_config(),
    )
    .await;
    let outcome = h.loader.load(&ctx(5), "a", LoadMode::First, NextSongPosition::Bottom).await;
    assert_eq!(
        outcome,
        PlayOutcome::Queued {
            track: track("Found", 1),
            position: 1
        }
    );
}

#[tokio::test]
async fn test_disabled_primary_goes_straight_to_fallback() {
    let h = harness(
        ScriptedBackend::new("primary").disabled(),
        ScriptedBackend::new("fallback").resolving(Ok(LoadResult::Track(track("Found", 1)))),
        music_config(),
    )
    .await;

    let outcome = h.loader.load(&ctx(5), "a", LoadMode::First, NextSongPosition::Bottom).await;
    assert!(matches!(outcome, PlayOutcome::Queued { .. }));
    assert_eq!(h.primary.network_calls(), 0);
}

#[tokio::test]
async fn test_structured_failure_is_surfaced() {
    let h = harness(
        ScriptedBackend::new("primary"),
        ScriptedBackend::new("fallback").resolving(Ok(LoadResult::Failed("blocked".into()))),
        music_config(),
    )
    .await;

    let outcome = h.loader.load(&ctx(5), "a", LoadMode::First, NextSongPosition::Bottom).await;
    assert_eq!(outcome, PlayOutcome::LoadFailed("blocked".into()));
}

#[tokio::test]
async fn test_song_cache_hit_skips_network() {
    let h = harness(
        ScriptedBackend::new("primary").searching(Ok(vec![track("Hit", 1), track("Other", 2)])),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;

    h.loader.load(&ctx(5), "hit song", LoadMode::First, NextSongPosition::Bottom).await;
    assert_eq!(h.primary.searches(), 1);

    let outcome = h.loader.load(&ctx(6), "hit song", LoadMode::First, NextSongPosition::Bottom).await;
    assert_eq!(
        outcome,
        PlayOutcome::Queued {
            track: track("Hit", 1),
            position: 2
        }
    );
    assert_eq!(h.primary.searches(), 1);
    assert_eq!(h.daos.song_cache.hits("hit song").await.unwrap(), 2);
}

#[tokio::test]
async fn test_link_playlist_honours_selected_track() {
    let playlist = Playlist {
        name: "Mix".into(),
        tracks: vec![track("one", 1), track("two", 2), track("three", 3)],
        selected: Some(1),
    };
    let h = harness(
        ScriptedBackend::new("primary").resolving(Ok(LoadResult::Playlist(playlist))),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;

    let url = "https://www.youtube.com/watch?v=two&list=mix";
    let outcome = h.loader.load(&ctx(5), url, LoadMode::First, NextSongPosition::Top).await;
    assert_eq!(
        outcome,
        PlayOutcome::Queued {
            track: track("two", 2),
            position: 1
        }
    );
    assert_eq!(h.primary.calls(), vec![format!("resolve:{url}")]);

    let outcome = h.loader.load(&ctx(5), url, LoadMode::Playlist, NextSongPosition::Bottom).await;
    assert_eq!(outcome, PlayOutcome::QueuedMany { accepted: 2, rejected: 1 });

    let queued = h.loader.players().get_or_create(1).queue.snapshot();
    assert!(queued.iter().all(|t| t.user_data.requester_id == 5));
}

#[tokio::test]
async fn test_pick_menu_belongs_to_requester() {
    let results: Vec<_> = (0..7).map(|i| track(&format!("r{i}"), i)).collect();
    let h = harness(
        ScriptedBackend::new("primary").searching(Ok(results)),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;

    let PlayOutcome::Menu(tracks) = h.loader.load(&ctx(5), "query", LoadMode::Pick, NextSongPosition::Bottom).await
    else {
        panic!("expected a menu");
    };
    assert_eq!(tracks.len(), 5);

    h.loader.open_menu(&ctx(5), 900, tracks, NextSongPosition::Bottom);
    assert_eq!(h.loader.choose_from_menu(&ctx(6), 900, 0).await, None);
    assert_eq!(
        h.loader.choose_from_menu(&ctx(5), 900, 1).await,
        Some(PlayOutcome::Queued {
            track: track("r1", 1),
            position: 1
        })
    );
    // Used up.
    assert_eq!(h.loader.choose_from_menu(&ctx(5), 900, 1).await, None);
}

#[tokio::test]
async fn test_menu_size_does_not_follow_match_candidates() {
    let results: Vec<_> = (0..7).map(|i| track(&format!("r{i}"), i)).collect();
    let h = harness(
        ScriptedBackend::new("primary").searching(Ok(results)),
        ScriptedBackend::new("fallback"),
        MusicConfig {
            menu_size: 3,
            match_candidates: 6,
            ..music_config()
        },
    )
    .await;

    let PlayOutcome::Menu(tracks) = h.loader.load(&ctx(5), "query", LoadMode::Pick, NextSongPosition::Bottom).await
    else {
        panic!("expected a menu");
    };
    assert_eq!(tracks.len(), 3);
}

#[tokio::test]
async fn test_external_track_tries_artists_then_title_then_other_source() {
    let h = harness(
        ScriptedBackend::new("primary")
            .answering(SearchSource::YouTube, "Song", vec![track("Unrelated", 999_999)])
            .answering(SearchSource::SoundCloud, "Song", vec![track("song (cover)", 1)]),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;
    let wanted = ExternalTrack {
        title: "Song".into(),
        artists: vec!["Band".into(), "Singer".into()],
        duration_ms: 200_000,
    };

    let outcome = h
        .loader
        .load_external_track(&ctx(5), &wanted, SearchSource::YouTube, NextSongPosition::Bottom)
        .await;

    assert_eq!(
        outcome,
        PlayOutcome::Queued {
            track: track("song (cover)", 1),
            position: 1
        }
    );
    assert_eq!(
        h.primary.calls(),
        vec![
            "search:YouTube:Song Band, Singer",
            "search:YouTube:Song",
            "search:SoundCloud:Song",
        ]
    );
}

#[tokio::test]
async fn test_external_track_stops_on_load_failure() {
    let h = harness(
        ScriptedBackend::new("primary"),
        ScriptedBackend::new("fallback").resolving(Ok(LoadResult::Failed("region locked".into()))),
        music_config(),
    )
    .await;
    let wanted = ExternalTrack {
        title: "Song".into(),
        artists: vec!["Band".into()],
        duration_ms: 200_000,
    };

    let outcome = h
        .loader
        .load_external_track(&ctx(5), &wanted, SearchSource::YouTube, NextSongPosition::Bottom)
        .await;
    assert_eq!(outcome, PlayOutcome::LoadFailed("region locked".into()));
    assert_eq!(h.primary.searches(), 1);
}

#[derive(Default)]
struct RecordingProgress {
    calls: AtomicUsize,
    result: Mutex<Option<(usize, usize)>>,
    done: Notify,
}

#[async_trait]
impl BatchProgress for RecordingProgress {
    async fn finished(&self, loaded: usize, failed: usize) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.result.lock() = Some((loaded, failed));
        self.done.notify_one();
    }
}

#[tokio::test]
async fn test_batch_reports_once_when_last_load_finishes() {
    let h = harness(
        ScriptedBackend::new("primary")
            .answering(SearchSource::YouTube, "A X", vec![track("A", 200_000)])
            .answering(SearchSource::YouTube, "B X", vec![track("b (official)", 1)]),
        ScriptedBackend::new("fallback"),
        MusicConfig {
            queue_limit: 10,
            ..music_config()
        },
    )
    .await;
    let batch: Vec<_> = ["A", "B", "C"]
        .into_iter()
        .map(|title| ExternalTrack {
            title: title.into(),
            artists: vec!["X".into()],
            duration_ms: 200_000,
        })
        .collect();
    let progress = Arc::new(RecordingProgress::default());

    let start = h
        .loader
        .load_external_batch(&ctx(5), batch, SearchSource::YouTube, NextSongPosition::Bottom, progress.clone())
        .await;
    assert_eq!(start, BatchStart::Started { total: 3 });

    tokio::time::timeout(Duration::from_secs(5), progress.done.notified())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(progress.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*progress.result.lock(), Some((2, 1)));
    assert_eq!(h.loader.players().get_or_create(1).queue.len(), 2);
}

#[tokio::test]
async fn test_batch_over_capacity_is_rejected_up_front() {
    let h = harness(
        ScriptedBackend::new("primary").searching(Ok(vec![track("x", 1)])),
        ScriptedBackend::new("fallback"),
        music_config(),
    )
    .await;
    fill_queue(&h.loader, 1);
    let batch: Vec<_> = (0..3)
        .map(|i| ExternalTrack {
            title: format!("t{i}"),
            artists: Vec::new(),
            duration_ms: 1,
        })
        .collect();
    let progress = Arc::new(RecordingProgress::default());

    let start = h
        .loader
        .load_external_batch(&ctx(5), batch, SearchSource::YouTube, NextSongPosition::Bottom, progress.clone())
        .await;

    assert_eq!(start, BatchStart::QueueFull { limit: 3 });
    assert_eq!(h.primary.network_calls(), 0);
    assert_eq!(progress.calls.load(Ordering::SeqCst), 0);
}
