pub mod chat;
pub mod health;
pub mod subscriber;
pub mod websocket;
