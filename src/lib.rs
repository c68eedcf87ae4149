//! urlminder: a Telegram bot that remembers links for you.
//!
//! Send it a URL and it saves the page. Ask for `/rnd` and it hands back a
//! random saved page, forgetting it afterwards.
//!
//! Internally a [`consumer::Consumer`] drives one [`events::Fetcher`] and
//! one [`events::Processor`]. The Telegram adapter and the local stdin
//! adapter both plug into that contract.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod consumer;
pub mod events;
pub mod logging;
pub mod storage;
pub mod telegram;
