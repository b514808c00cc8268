// SPDX-License-Identifier: Apache-2.0
//! Wire payloads for the Meridian control plane.
//!
//! The plane does not define a transport of its own — HTTP binding and
//! queue plumbing live outside. What it does define is the exact *shape*
//! of what crosses the boundary: the inbound heartbeat message with its
//! bounds, and the JSON bodies of the KV and approval surfaces. Everything
//! here validates on decode; a message that violates one documented bound
//! is rejected whole.

mod approval_api;
mod heartbeat;
mod kv_api;

pub use approval_api::{ApprovalView, CreateApprovalBody, DecisionBody};
pub use heartbeat::{parse_heartbeat, HeartbeatMessage};
pub use kv_api::{KvItemsResponse, KvKeysResponse, KvReadResponse, KvWriteBody, KvWriteResponse};
