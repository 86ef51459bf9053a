//! Aggregation engine internals.
//!
//! The engine turns per-producer sub-buffers into whole interleaved blocks:
//!
//! ```text
//! Audio Thread → BlockAggregator → MixBuffer → OpenConnection → Transport
//!                      │   (no transport)          ▲
//!                      └──→ SpoolBuffer ── replay ─┘ (at connect)
//! ```
//!
//! - **BlockAggregator**: Tracks which producers reported this block and
//!   interleaves their sub-buffers at the layout offsets
//! - **SpoolBuffer**: Holds sub-buffers while no transport is live, replayed
//!   into the fresh mix buffer once one is
//! - **ConnectionManager / OpenConnection**: Slow connect/close on the
//!   control thread; bounded write/read on the audio thread
//!
//! Everything the audio thread touches is preallocated at layout changes,
//! so the submit and pull paths never allocate.

mod aggregator;
mod connection;
mod spool;

pub(crate) use aggregator::{interleave_into, BlockAggregator, SubmitMark};
pub(crate) use connection::{ConnectionManager, OpenConnection};
pub(crate) use spool::SpoolBuffer;
