/*!
Services of the onion relay network: the registry, relays peeling one layer
per hop, and users building circuits and receiving messages.

All services talk to each other with framed [`Request`](onion_packet::Request)
and [`Response`](onion_packet::Response) packets over TCP, one request per
connection.
*/

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod circuit;
pub mod config;
pub mod diagnostics;
pub mod net;
pub mod network;
pub mod registry;
pub mod relay;
pub mod stats;
pub mod user;
