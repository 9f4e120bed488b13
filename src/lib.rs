pub mod ai;
pub mod ari;
pub mod config;
pub mod logging;
pub mod media;
pub mod retry;
pub mod rtp;
pub mod segment;
pub mod session;
