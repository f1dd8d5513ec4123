// Copyright 2026 The Suture Project
// SPDX-License-Identifier: Apache-2.0

// Simple pass-through streaming.
//
// For upstreams that terminate their own streams reliably there is nothing
// to interpret: bytes are forwarded as they arrive, capped per write so one
// oversized upstream chunk cannot stall the client, and every write is
// flushed as its own body frame.

use bytes::Bytes;
use futures_util::StreamExt;

use super::handler::{ClientSink, SessionError};
use crate::upstream::ByteStream;

/// Largest chunk handed to the client in one write.
pub const MAX_FORWARD_CHUNK: usize = 8 * 1024;

/// Copy the upstream body to the client until EOF.
///
/// Upstream read errors end the copy quietly: the client already holds a
/// partial stream and there is no retry on this path. A downstream write
/// failure is surfaced so the caller can stop the session.
pub async fn pass_through(mut upstream: ByteStream, sink: &mut ClientSink) -> Result<(), SessionError> {
    loop {
        let next = tokio::select! {
            next = upstream.next() => next,
            _ = sink.closed() => return Err(SessionError::ClientGone),
        };

        let mut chunk: Bytes = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "upstream read error during pass-through");
                return Ok(());
            }
            None => return Ok(()),
        };

        while !chunk.is_empty() {
            let piece = chunk.split_to(chunk.len().min(MAX_FORWARD_CHUNK));
            sink.write(piece).await?;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
