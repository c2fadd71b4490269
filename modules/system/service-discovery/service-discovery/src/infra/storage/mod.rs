pub mod entity;
pub mod eviction;
pub mod migrations;
pub mod sea_orm_repo;

pub use eviction::EvictionTimers;
pub use sea_orm_repo::SeaOrmNodesRepository;
