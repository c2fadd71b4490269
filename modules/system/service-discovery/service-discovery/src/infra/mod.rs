pub mod broadcast;
pub mod health;
pub mod http;
pub mod storage;
