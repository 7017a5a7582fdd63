#![forbid(unsafe_code)]

pub mod audit;
pub mod auth;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod http;
pub mod hub;
pub mod moderation;
pub mod rate_limit;
pub mod rooms;
pub mod sessions;
pub mod stream;
pub mod sweeper;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod dispatcher_tests;




#[cfg(test)]
mod moderation_tests;


#[cfg(test)]
mod stream_tests;
