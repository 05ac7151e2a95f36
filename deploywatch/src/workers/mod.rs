pub mod poller;
pub mod stream;
