pub mod controller;
pub mod events;
pub mod mode;
pub mod poll_session;
