// src/chat/mod.rs
pub mod command;
pub mod event;
pub mod onebot;
pub mod quote;
