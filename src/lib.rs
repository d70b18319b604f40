use std::sync::Arc;

use config::Config;

pub mod api;
pub mod bus;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ghost;
pub mod infrastructure;
pub mod location;
pub mod middleware;
pub mod result;
pub mod router;
pub mod storage;
pub mod utils;

use cache::operations::family::FamilyCacheOperations;
use cache::operations::geofence::GeofenceCacheOperations;
use cache::operations::ghost::GhostCacheOperations;
use cache::operations::location::LocationCacheOperations;
use database::repositories::family::FamilyRepository;
use database::repositories::ghost::GhostRepository;
use database::RepositoryClient;
use gateway::{RoomRegistry, SessionRegistry};
use ghost::GhostModeService;
use infrastructure::auth::TokenVerifier;
use location::LocationService;
use storage::{PubSubHub, RedisStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<RedisStore>,
    pub hub: Arc<PubSubHub>,
    pub verifier: TokenVerifier,
    pub families: Arc<FamilyCacheOperations>,
    pub geofences: Arc<GeofenceCacheOperations>,
    pub locations: Arc<LocationCacheOperations>,
    pub ghost: Arc<GhostModeService>,
    pub location_service: Arc<LocationService>,
    pub rooms: Arc<RoomRegistry>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    /// 装配全部组件
    /// KV连接就绪是服务就绪的前置条件，失败直接报错
    pub async fn initialize(config: Config) -> Result<Self, redis::RedisError> {
        let store = Arc::new(RedisStore::connect(&config.redis_url).await?);
        let hub = Arc::new(PubSubHub::new(redis::Client::open(
            config.redis_url.as_str(),
        )?));

        let verifier = TokenVerifier::new(&config.jwt_secret);

        // 管理句柄做扇出查询，租户句柄做用户侧操作
        let admin = RepositoryClient::admin(&config);
        let tenant = RepositoryClient::tenant(&config);
        if admin.is_none() {
            tracing::warn!("Repository not configured, reads degrade to empty results");
        }

        let family_repository = Arc::new(FamilyRepository::new(admin.clone()));
        let ghost_repository = Arc::new(GhostRepository::new(admin));
        let ghost_tenant_repository = Arc::new(GhostRepository::new(tenant));

        let families = Arc::new(FamilyCacheOperations::new(
            store.clone(),
            family_repository.clone(),
            config.cache_enabled,
        ));
        let geofences = Arc::new(GeofenceCacheOperations::new(
            store.clone(),
            family_repository,
            config.cache_enabled,
        ));
        let locations = Arc::new(LocationCacheOperations::new(
            store.clone(),
            config.cache_enabled,
        ));
        let ghost_cache = Arc::new(GhostCacheOperations::new(
            store.clone(),
            config.cache_enabled,
        ));

        let ghost = Arc::new(GhostModeService::new(
            ghost_cache,
            families.clone(),
            ghost_repository,
            ghost_tenant_repository,
        ));

        let location_service = Arc::new(LocationService::new(
            store.clone(),
            locations.clone(),
            families.clone(),
            geofences.clone(),
            ghost.clone(),
        ));

        Ok(Self {
            config,
            store,
            hub,
            verifier,
            families,
            geofences,
            locations,
            ghost,
            location_service,
            rooms: Arc::new(RoomRegistry::new()),
            sessions: Arc::new(SessionRegistry::new()),
        })
    }
}
