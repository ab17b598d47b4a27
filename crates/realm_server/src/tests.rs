use crate::*;
use realm_core::{
    CharacterInfo, MapId, Persistence, Position, RegionBounds, Session, SessionError, ShardConfig,
    ShardError, ShardState, WorldObject,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct CountingSession {
    packets: AtomicUsize,
    kicks: AtomicUsize,
}

impl Session for CountingSession {
    fn send(&self, _packet: &[u8]) -> Result<(), SessionError> {
        self.packets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn kick(&self, _reason: &str) {
        self.kicks.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct CountingPersistence {
    saves: AtomicUsize,
}

impl Persistence for CountingPersistence {
    fn save_now(&self, _object: &WorldObject) -> bool {
        self.saves.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn fast_config() -> ServerConfig {
    ServerConfig {
        default_shard: ShardConfig {
            update_delay_ms: 10,
            rng_seed: Some(1),
            ..ShardConfig::default()
        },
        status_interval_secs: 0,
        autosave_interval_secs: 0,
        shutdown_timeout_ms: 5_000,
    }
}

fn two_maps(server: &RealmServer) {
    server
        .create_shard(&MapDefinition::new(MapId(0), "Eastern Kingdoms"))
        .unwrap();
    server.create_shard(&MapDefinition::new(MapId(1), "Kalimdor")).unwrap();
}

async fn login(server: &RealmServer, map: MapId, name: &str) -> (realm_core::EntityId, Arc<CountingSession>) {
    let session = Arc::new(CountingSession::default());
    let object = WorldObject::character(
        CharacterInfo::new(name),
        session.clone(),
        Position::new(100.0, 100.0, 0.0),
    );
    let id = object.id();
    server
        .get_shard(map)
        .unwrap()
        .add_message_and_wait_async(move |ctx| {
            ctx.add_object_now(object).unwrap();
        })
        .await
        .unwrap();
    (id, session)
}

#[test]
fn duplicate_maps_are_refused() {
    let server = RealmServer::new(fast_config());
    two_maps(&server);
    let again = server.create_shard(&MapDefinition::new(MapId(1), "Kalimdor"));
    assert!(matches!(again, Err(ServerError::Config(_))));
    assert_eq!(server.map_ids(), vec![MapId(0), MapId(1)]);
}

#[test]
fn invalid_map_bounds_surface_as_shard_errors() {
    let server = RealmServer::new(fast_config());
    let mut map = MapDefinition::new(MapId(7), "Inverted");
    map.bounds = RegionBounds {
        min_x: 10.0,
        max_x: -10.0,
        ..RegionBounds::default()
    };
    assert!(matches!(
        server.create_shard(&map),
        Err(ServerError::Shard(ShardError::InvalidConfig(_)))
    ));
    assert_eq!(server.shard_count(), 0);
}

#[test]
fn per_map_shard_settings_override_the_defaults() {
    let server = RealmServer::new(fast_config());
    let mut map = MapDefinition::new(MapId(30), "Deadmines");
    map.shard = Some(ShardConfig {
        update_delay_ms: 50,
        ..ShardConfig::default()
    });
    let shard = server.create_shard(&map).unwrap();
    assert_eq!(shard.config().update_delay_ms, 50);
    let other = server.create_shard(&MapDefinition::new(MapId(31), "Stockade")).unwrap();
    assert_eq!(other.config().update_delay_ms, 10);
}

#[test]
fn unknown_maps_are_reported() {
    let server = RealmServer::new(fast_config());
    assert_eq!(server.dispose_shard(MapId(9)), Err(ServerError::UnknownMap(MapId(9))));
    assert_eq!(
        server.transfer(realm_core::EntityId::new(), MapId(9), MapId(10), Position::new(0.0, 0.0, 0.0)),
        Err(ServerError::UnknownMap(MapId(9)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paused_world_refuses_start_all() {
    let server = RealmServer::new(fast_config());
    two_maps(&server);

    server.pause();
    assert!(matches!(
        server.start_all(),
        Err(ServerError::Shard(ShardError::WorldPaused(_)))
    ));
    assert!(server.stats().shards.iter().all(|s| s.state == ShardState::Stopped));

    server.resume();
    assert_eq!(server.start_all().unwrap(), 2);
    server.shutdown_shards().await.unwrap();
    assert_eq!(server.shard_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn characters_transfer_between_shards() {
    let server = RealmServer::new(fast_config());
    two_maps(&server);
    server.start_all().unwrap();

    let (id, session) = login(&server, MapId(0), "Thrall").await;
    let (source, target) = (server.get_shard(MapId(0)).unwrap(), server.get_shard(MapId(1)).unwrap());
    assert_eq!((source.online_count(), target.online_count()), (1, 0));

    server
        .transfer(id, MapId(0), MapId(1), Position::new(2000.0, 2000.0, 0.0))
        .unwrap();
    source.wait_one_tick_async().await.unwrap();
    target.wait_one_tick_async().await.unwrap();

    assert_eq!((source.online_count(), target.online_count()), (0, 1));
    let arrived = target
        .add_message_and_wait_async(move |ctx| {
            let object = ctx.get_object(&id).unwrap();
            assert!(!object.is_teleporting());
            assert_eq!(object.position().point.x, 2000.0);
        })
        .await;
    assert!(arrived.is_ok());
    assert_eq!(session.kicks.load(Ordering::SeqCst), 0);

    server.shutdown_shards().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transfer_outside_the_target_bounds_is_refused() {
    let server = RealmServer::new(fast_config());
    two_maps(&server);
    let result = server.transfer(
        realm_core::EntityId::new(),
        MapId(0),
        MapId(1),
        Position::new(-50.0, 0.0, 0.0),
    );
    assert!(matches!(result, Err(ServerError::Shard(ShardError::OutOfBounds(_)))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_reaches_every_shard() {
    let server = RealmServer::new(fast_config());
    two_maps(&server);
    server.start_all().unwrap();

    login(&server, MapId(0), "Jaina").await;
    login(&server, MapId(1), "Sylvanas").await;
    login(&server, MapId(1), "Baine").await;

    assert_eq!(server.online_count(), 3);
    assert_eq!(server.broadcast(b"server restart in 5 minutes"), 3);
    assert_eq!(server.stats().total_characters, 3);

    server.shutdown_shards().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_all_hands_characters_to_persistence() {
    let persistence = Arc::new(CountingPersistence::default());
    let server = RealmServer::new(fast_config()).with_persistence(persistence.clone());
    two_maps(&server);
    server.start_all().unwrap();

    login(&server, MapId(0), "Varian").await;
    login(&server, MapId(1), "Garrosh").await;

    assert_eq!(server.save_all(), 2);
    for map in server.map_ids() {
        server.get_shard(map).unwrap().wait_one_tick_async().await.unwrap();
    }
    assert_eq!(persistence.saves.load(Ordering::SeqCst), 2);

    // Shutdown saves once more before stopping.
    server.shutdown_shards().await.unwrap();
    assert_eq!(persistence.saves.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disposing_one_shard_leaves_the_others_running() {
    let server = RealmServer::new(fast_config());
    two_maps(&server);
    server.start_all().unwrap();

    let removed = server.get_shard(MapId(0)).unwrap();
    server.dispose_shard(MapId(0)).unwrap();
    assert!(server.get_shard(MapId(0)).is_none());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !removed.is_disposed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(server.get_shard(MapId(1)).unwrap().is_running());

    server.shutdown_shards().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_returns_after_shutdown() {
    let server = Arc::new(RealmServer::new(fast_config()));
    two_maps(&server);
    let shards: Vec<_> = server
        .map_ids()
        .into_iter()
        .filter_map(|id| server.get_shard(id))
        .collect();

    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move { running.run().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while !shards.iter().all(|s| s.is_running()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    server.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Ok(()));
    assert_eq!(server.shard_count(), 0);
    assert!(shards.iter().all(|s| s.is_disposed()));
}
