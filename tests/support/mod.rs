pub mod feeds;
pub mod socket_guard;
