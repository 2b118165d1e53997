//! Streaming protocol client.
//!
//! The streaming server speaks JSON over a single WebSocket. A session is
//! opened with an `ADMIN`/`LOGIN` request carrying the credential derived from
//! the user principals, then subscribes to channels with `SUBS` requests.
//!
//! - [`messages`]: request/response/data frame types and frame parsing
//! - [`streamer`]: the session client: handshake, request correlation,
//!   channel dispatch and logout
//!
//! ## Frames
//!
//! | Direction | Shape | Routed by |
//! |---|---|---|
//! | outbound | `{"service","command","requestid","account","source","parameters"}` | - |
//! | inbound | `{"response":[...]}` | `requestid` |
//! | inbound | `{"data":[...]}` | `service` |
//! | inbound | `{"notify":[...]}` | ignored |

pub mod messages;
pub mod streamer;
