//! # audio-exchange
//!
//! Live audio routing between capture and playback devices.
//!
//! `audio-exchange` moves raw 16-bit audio from any number of input devices
//! to any number of output devices simultaneously, with independent gain,
//! optional stereo channel swap, and optional mute per output. A single
//! background thread does all the moving, napping adaptively so idle routes
//! cost almost no CPU.
//!
//! Input and output sample formats must already match; the engine performs
//! no resampling or format conversion, keeps no configuration across
//! restarts, and defines no wire protocol.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use audio_exchange::{ExchangeConfig, ExchangeLoop, RouteRegistry};
//! use audio_exchange::device::{CpalInput, CpalOutput};
//!
//! let registry = Arc::new(RouteRegistry::new());
//! let exchange = Arc::new(ExchangeLoop::new(registry.clone(), ExchangeConfig::default()));
//! exchange.clone().start(true)?;
//!
//! // Keep the guards alive: dropping them stops the OS streams.
//! let (_mic_guard, mic) = CpalInput::open_default()?;
//! let (_spk_guard, speakers) = CpalOutput::open_default()?;
//! let speakers_id = speakers.id();
//!
//! let route = registry.get_or_create(mic);
//! route.attach(speakers)?;
//! route.start()?;
//!
//! // The loop now carries mic audio to the speakers; adjust live:
//! route.set_gain(&speakers_id, 1.2);
//! route.set_swap(&speakers_id, true);
//! ```
//!
//! ## Architecture
//!
//! - **Caller threads** (typically a UI) mutate routes, consumers, and
//!   control values; no operation blocks on the engine.
//! - **The exchange thread** iterates immutable snapshots of the route and
//!   consumer collections, republished atomically on every mutation, so it
//!   never waits on a lock to see a consistent view. A mutation becomes
//!   audible within one loop pass.
//! - **Audio callbacks** (CPAL backend) exchange bytes with the engine
//!   through lock-free SPSC rings and never block.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
pub mod device;
mod error;
mod event;
mod exchange;
mod processor;
mod registry;
mod route;

pub use config::ExchangeConfig;
pub use device::{DeviceCapability, DeviceId, InputDevice, OutputDevice};
pub use error::ExchangeError;
pub use event::{event_callback, EventCallback, ExchangeEvent};
pub use exchange::{ExchangeDiagnostics, ExchangeLoop};
pub use processor::{from_gain, to_gain, SampleProcessor};
pub use registry::RouteRegistry;
pub use route::AudioRoute;
