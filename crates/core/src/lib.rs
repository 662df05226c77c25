pub mod annotation;
pub mod dispatch;
pub mod engine;
pub mod history;
pub mod profiles;
pub mod registry;
pub mod render;
pub mod settings;
