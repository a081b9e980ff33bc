pub mod db;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod pi;
pub mod poller;
pub mod store;
