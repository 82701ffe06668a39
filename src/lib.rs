pub mod cli;
pub mod collector;
pub mod config;
pub mod event;
pub mod persister;
pub mod publisher;
pub mod retry;
pub mod storage;
pub mod stream;
pub mod watchdog;
pub mod web;
