pub mod feed;
pub mod storage;
pub mod subscription;
pub mod sync;
