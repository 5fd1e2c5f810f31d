//! Command/verify sequencing engine for a spectrograph calibration bench.
//!
//! This library drives the bench through a fixed sequence of hardware
//! operations: select a light source, configure attenuation and shutters,
//! set exposure parameters, trigger and wait out exposures, repeat across
//! one or more sequence files, and optionally power the lamps down at the
//! end.
//!
//! The core abstractions:
//!
//! - [`keyword::KeywordStore`]: the abstract device layer (read / write /
//!   bounded-poll against named services and keywords).
//! - [`actions::Action`]: one discrete operation as a precondition /
//!   perform / postcondition contract, verified by independent read-back.
//! - [`sequencer::Sequencer`]: the single-threaded run loop composing the
//!   action library over a [`sequencer::RunPlan`].
//!
//! The device layer is slow and only partially observable (lamps with
//! warm-up latency, a detector with multi-second exposure and readout,
//! interlocked power outlets), so every actuation is re-queried and every
//! wait carries an explicit timeout. A run executes to completion or to
//! the first unrecoverable error; there is no retry and no rollback.

pub mod actions;
pub mod detector;
pub mod error;
pub mod keyword;
pub mod lamp;
pub mod mock;
pub mod sequence;
pub mod sequencer;
