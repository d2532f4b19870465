pub mod animation;
pub mod clock;
pub mod conversation;
pub mod error;
pub mod host;
pub mod models;
pub mod paths;
pub mod prompts;
pub mod providers;
pub mod selector;
pub mod store;
