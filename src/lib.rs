pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod flow;
pub mod input;
pub mod locator;
pub mod logging;
pub mod mail;
pub mod poll;
pub mod session;
pub mod steel;
