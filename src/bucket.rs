//! Token bucket refill-and-consume step.
//!
//! The same procedure exists twice: [`refill_and_consume`] is the native form
//! used by in-process stores, and [`TOKEN_BUCKET_SCRIPT`] is the Lua form
//! executed atomically by script-capable stores such as Redis. Both take the
//! four encoded arguments produced by [`BucketArgs::encode`] and answer with
//! the three integers read by [`Decision::from_reply`].

use crate::error::{ArgumentError, ReplyError};
use std::time::Duration;

/// Lua source of the bucket procedure (`KEYS[1]` = key, `ARGV` = [`BucketArgs::encode`]).
pub const TOKEN_BUCKET_SCRIPT: &str = include_str!("token_bucket.lua");

/// Persisted per-key state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Permits currently in the bucket, `0 <= stored_permits <= max_permits`.
    pub stored_permits: f64,
    /// Time of the last refill. Never moves backwards.
    pub last_refill_micros: u64,
}

impl BucketState {
    /// A freshly created bucket starts full.
    pub fn full(max_permits: f64, now_micros: u64) -> Self {
        Self { stored_permits: max_permits, last_refill_micros: now_micros }
    }
}

/// Inputs of one bucket call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketArgs {
    /// Micros needed to regenerate one permit.
    pub stable_interval_micros: f64,
    /// Bucket capacity.
    pub max_permits: f64,
    /// Caller's current time.
    pub now_micros: u64,
    /// Permits the caller wants to consume.
    pub requested_permits: u64,
}

impl BucketArgs {
    const NAMES: [&'static str; 4] =
        ["stable_interval_micros", "max_permits", "now_micros", "requested_permits"];

    /// Encode as ordered decimal strings: interval, capacity, now, permits.
    pub fn encode(&self) -> [String; 4] {
        [
            self.stable_interval_micros.to_string(),
            self.max_permits.to_string(),
            self.now_micros.to_string(),
            self.requested_permits.to_string(),
        ]
    }

    /// Inverse of [`BucketArgs::encode`], validating ranges.
    pub fn decode(args: &[String]) -> Result<Self, ArgumentError> {
        if args.len() != Self::NAMES.len() {
            return Err(ArgumentError::Arity(args.len()));
        }
        let stable_interval_micros = parse_positive_f64(Self::NAMES[0], &args[0])?;
        let max_permits = parse_positive_f64(Self::NAMES[1], &args[1])?;
        let now_micros = parse_u64(Self::NAMES[2], &args[2])?;
        let requested_permits = parse_u64(Self::NAMES[3], &args[3])?;
        if requested_permits == 0 {
            return Err(ArgumentError::OutOfRange { name: Self::NAMES[3] });
        }
        Ok(Self { stable_interval_micros, max_permits, now_micros, requested_permits })
    }
}

fn parse_positive_f64(name: &'static str, raw: &str) -> Result<f64, ArgumentError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| ArgumentError::Unparsable { name, value: raw.to_string() })?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ArgumentError::OutOfRange { name })
    }
}

fn parse_u64(name: &'static str, raw: &str) -> Result<u64, ArgumentError> {
    raw.parse().map_err(|_| ArgumentError::Unparsable { name, value: raw.to_string() })
}

/// Outcome of one bucket call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the permits were consumed.
    pub allowed: bool,
    /// Earliest time a request of the same or smaller size is expected to succeed.
    pub next_free_ticket_micros: u64,
    /// Whole permits left after the call. Informational only.
    pub stored_permits: u64,
}

impl Decision {
    /// Encode as the store's reply: `[allowed, next_free_ticket_micros, stored_permits]`.
    pub fn to_reply(&self) -> [i64; 3] {
        [
            i64::from(self.allowed),
            i64::try_from(self.next_free_ticket_micros).unwrap_or(i64::MAX),
            i64::try_from(self.stored_permits).unwrap_or(i64::MAX),
        ]
    }

    /// Decode a store reply. Any positive flag means admitted.
    pub fn from_reply(reply: &[i64]) -> Result<Self, ReplyError> {
        let [flag, next, stored] = reply else {
            return Err(ReplyError::Arity(reply.len()));
        };
        let non_negative = |field: &'static str, value: i64| {
            u64::try_from(value).map_err(|_| ReplyError::Negative { field, value })
        };
        Ok(Self {
            allowed: *flag > 0,
            next_free_ticket_micros: non_negative("next_free_ticket_micros", *next)?,
            stored_permits: non_negative("stored_permits", *stored)?,
        })
    }

    /// How long after `now_micros` the caller should wait before retrying.
    pub fn retry_after(&self, now_micros: u64) -> Duration {
        if self.allowed {
            Duration::ZERO
        } else {
            Duration::from_micros(self.next_free_ticket_micros.saturating_sub(now_micros))
        }
    }
}

/// Refill the bucket for the time elapsed since its last refill, then try to
/// take `requested_permits` out of it.
///
/// A denied request leaves the refilled bucket untouched: no debt is created.
/// A clock that runs backwards refills nothing and does not move
/// `last_refill_micros`.
pub fn refill_and_consume(state: Option<BucketState>, args: &BucketArgs) -> (BucketState, Decision) {
    let now = args.now_micros;
    let mut state = state.unwrap_or_else(|| BucketState::full(args.max_permits, now));

    let elapsed = now.saturating_sub(state.last_refill_micros);
    state.stored_permits = (state.stored_permits + elapsed as f64 / args.stable_interval_micros)
        .min(args.max_permits);
    if now > state.last_refill_micros {
        state.last_refill_micros = now;
    }

    let requested = args.requested_permits as f64;
    let decision = if state.stored_permits >= requested {
        state.stored_permits -= requested;
        Decision {
            allowed: true,
            next_free_ticket_micros: now,
            stored_permits: state.stored_permits.floor() as u64,
        }
    } else {
        let deficit = requested - state.stored_permits;
        let wait_micros = (deficit * args.stable_interval_micros).ceil() as u64;
        Decision {
            allowed: false,
            next_free_ticket_micros: now.saturating_add(wait_micros),
            stored_permits: state.stored_permits.floor() as u64,
        }
    };

    (state, decision)
}
