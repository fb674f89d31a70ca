/*! Request/response transport over TCP.
*/

pub mod client;
pub mod codec;
pub mod server;
