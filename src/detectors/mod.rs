//! Pattern detectors
//!
//! Each detector looks at the latest bar of a window and either reports one
//! match or nothing.
//!
//! # Pattern Families
//!
//! - **Breakout / Reversal**: ranges, triangles, flags, wedges, channels, double and triple tops,
//!   head and shoulders, divergences
//! - **Momentum / Volume**: RSI, MACD, stochastic, Bollinger, Ichimoku, volume spikes and flow
//! - **Scalping / Options**: VWAP, fast EMA crosses, gamma squeezes, IV crush, pin risk
//! - **Candlesticks**: single, two and three bar formations
//! - **Structure**: harmonic XABCD, chart geometry, wave counts

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod breakout;
pub mod chart;
pub mod harmonic;
pub mod momentum;
pub mod options;
pub mod reversal;
pub mod scalping;
pub mod single_bar;
pub mod three_bar;
pub mod two_bar;
pub mod volume;
pub mod wave;

// Re-export all detectors for convenience
pub use breakout::*;
pub use chart::*;
pub use harmonic::*;
pub use helpers::*;
pub use momentum::*;
pub use options::*;
pub use reversal::*;
pub use scalping::*;
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;
pub use volume::*;
pub use wave::*;
