//! Discovery, download and catalog handoff for GRACE Tellus L3 GSM solutions.

pub mod app;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod filter;
pub mod index;
pub mod layout;
pub mod links;
pub mod output;
pub mod transfer;
