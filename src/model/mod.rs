pub mod action;
pub mod request;
pub mod settings;
pub mod timestamp;
