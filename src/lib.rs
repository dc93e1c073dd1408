#![forbid(unsafe_code)]

pub mod app;
pub mod article;
pub mod book;
pub mod chat;
pub mod cli;
pub mod config;
pub mod content;
pub mod credentials;
pub mod epub;
pub mod export;
pub mod gemini;
pub mod llm;
pub mod logging;
pub mod markdown;
pub mod model;
pub mod openrouter;
pub mod outline;
pub mod perplexity;
pub mod persona;
pub mod schedule;
pub mod scheduler;
pub mod site;
pub mod store;
pub mod wordpress;
