pub mod action;
pub mod chat;
pub mod event;
