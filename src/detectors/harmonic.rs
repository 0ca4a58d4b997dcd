//! Harmonic XABCD patterns and the plain AB=CD
//!
//! Legs come from the zig-zag of the window, with the latest pivot allowed to be
//! unconfirmed: the pattern completes at D, which must sit on one of the last
//! few bars. Each leg is measured as a ratio of the leg before it.

use super::helpers::{clamp_unit, matched, window_swings};
use crate::{
    indicators::{Swing, SwingKind},
    Direction, MarketContext, PatternDetector, PatternFamily, PatternMatch, PatternType, Period,
    OHLCV,
};

impl_with_defaults!(HarmonicDetector);

/// Inclusive bounds for one leg ratio
type Band = (f64, f64);

#[inline]
fn within((lo, hi): Band, value: f64) -> bool {
    (lo..=hi).contains(&value)
}

/// Ratio windows of one XABCD pattern
#[derive(Debug, Clone, Copy)]
struct Template {
    pattern: PatternType,
    /// AB / XA
    b: Band,
    /// BC / AB
    c: Band,
    /// AD / XA
    d: Band,
    /// Textbook AD / XA
    ideal_d: f64,
}

/// Checked in order; the first fit wins.
const TEMPLATES: [Template; 4] = [
    Template {
        pattern: PatternType::Gartley,
        b: (0.55, 0.68),
        c: (0.382, 0.886),
        d: (0.74, 0.83),
        ideal_d: 0.786,
    },
    Template {
        pattern: PatternType::Bat,
        b: (0.382, 0.5),
        c: (0.382, 0.886),
        d: (0.85, 0.92),
        ideal_d: 0.886,
    },
    Template {
        pattern: PatternType::Butterfly,
        b: (0.74, 0.83),
        c: (0.382, 0.886),
        d: (1.2, 1.65),
        ideal_d: 1.27,
    },
    Template {
        pattern: PatternType::Crab,
        b: (0.382, 0.618),
        c: (0.382, 0.886),
        d: (1.5, 1.7),
        ideal_d: 1.618,
    },
];

/// BC / AB band for AB=CD
const ABCD_C: Band = (0.382, 0.886);
/// CD / AB band for AB=CD
const ABCD_D: Band = (0.9, 1.1);

/// Share of the final leg retraced for the target
const TARGET_RETRACE: f64 = 0.618;

/// Direction implied by the completing pivot: a low at D is a buy
#[inline]
fn completion_direction(d: &Swing) -> Direction {
    match d.kind {
        SwingKind::Low => Direction::Bullish,
        SwingKind::High => Direction::Bearish,
    }
}

/// XABCD and AB=CD detector over the zig-zag of the window
#[derive(Debug, Clone, Copy)]
pub struct HarmonicDetector {
    pub lookback: Period,
    pub swing_distance: Period,
    /// D must be within this many bars of the latest one
    pub recency: usize,
}

impl Default for HarmonicDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(100),
            swing_distance: Period::new_const(3),
            recency: 3,
        }
    }
}

impl HarmonicDetector {
    fn xabcd(&self, legs: &[Swing], close: f64) -> Option<PatternMatch> {
        let [x, a, b, c, d] = legs else {
            return None;
        };
        let xa = (a.price - x.price).abs();
        let ab = (b.price - a.price).abs();
        let bc = (c.price - b.price).abs();
        let ad = (d.price - a.price).abs();
        if xa <= 0.0 || ab <= 0.0 {
            return None;
        }
        let (rb, rc, rd) = (ab / xa, bc / ab, ad / xa);

        let template = TEMPLATES
            .iter()
            .find(|t| within(t.b, rb) && within(t.c, rc) && within(t.d, rd))?;
        let direction = completion_direction(d);
        let sign = direction.sign();
        let target = d.price + sign * TARGET_RETRACE * ad;
        // retracement patterns are invalidated past X, extensions a little past D
        let stop = if template.ideal_d < 1.0 {
            x.price
        } else {
            d.price - sign * 0.1 * xa
        };
        let error = (rd - template.ideal_d).abs() / template.ideal_d;

        matched(
            template.pattern,
            direction,
            clamp_unit(0.55 + 0.3 * (1.0 - 5.0 * error)),
            close,
            (target, stop),
        )
    }

    fn abcd(&self, legs: &[Swing], close: f64) -> Option<PatternMatch> {
        let [a, b, c, d] = legs else {
            return None;
        };
        let ab = (b.price - a.price).abs();
        let bc = (c.price - b.price).abs();
        let cd = (d.price - c.price).abs();
        if ab <= 0.0 || !within(ABCD_C, bc / ab) || !within(ABCD_D, cd / ab) {
            return None;
        }
        let direction = completion_direction(d);
        let sign = direction.sign();

        matched(
            PatternType::Abcd,
            direction,
            0.5 + 0.2 * (1.0 - 10.0 * (cd / ab - 1.0).abs()),
            close,
            (d.price + sign * TARGET_RETRACE * cd, d.price - sign * 0.1 * ab),
        )
    }
}

impl PatternDetector for HarmonicDetector {
    fn name(&self) -> &'static str {
        "harmonic"
    }

    fn family(&self) -> PatternFamily {
        PatternFamily::Harmonic
    }

    fn min_bars(&self) -> usize {
        40
    }

    fn detect<T: OHLCV>(&self, _bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let n = ctx.len();
        if n < self.min_bars() {
            return None;
        }
        let swings = window_swings(ctx, self.lookback.get(), self.swing_distance.get());

        let d = swings.last()?;
        if d.index + self.recency < n - 1 {
            return None;
        }
        let close = ctx.last_close()?;
        // D must still hold: price has not run through it
        let holds = match completion_direction(d) {
            Direction::Bullish => close >= d.price,
            _ => close <= d.price,
        };
        if !holds {
            return None;
        }

        let count = swings.len();
        count
            .checked_sub(5)
            .and_then(|i| self.xabcd(&swings[i..], close))
            .or_else(|| {
                count
                    .checked_sub(4)
                    .and_then(|i| self.abcd(&swings[i..], close))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, ContextProvider, DefaultContextProvider, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn path(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap();
        let mut prev = closes[0];
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let open = (prev + c) / 2.0;
                let bar = Bar::new(
                    open,
                    open.max(c) + 0.2,
                    open.min(c) - 0.2,
                    c,
                    1_000,
                    t0 + Duration::minutes(15 * i as i64),
                );
                prev = c;
                bar
            })
            .collect()
    }

    fn knots(points: &[(usize, f64)]) -> Vec<f64> {
        let mut out = Vec::new();
        for w in points.windows(2) {
            let ((i0, p0), (i1, p1)) = (w[0], w[1]);
            for i in i0..i1 {
                out.push(p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64);
            }
        }
        if let Some(&(_, last)) = points.last() {
            out.push(last);
        }
        out
    }

    fn run(bars: &[Bar]) -> Option<PatternMatch> {
        let ctx = DefaultContextProvider::default().compute(bars, Timeframe::FifteenMinutes);
        HarmonicDetector::default().detect(bars, &ctx)
    }

    #[test]
    fn test_bullish_gartley() {
        // X 100, A 110, B at 0.618 of XA, C back up, D at 0.786 of XA
        let closes = knots(&[
            (0, 104.0),
            (8, 100.0),
            (18, 110.0),
            (26, 103.82),
            (34, 107.5),
            (42, 102.14),
        ]);
        let m = run(&path(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::Gartley);
        assert_eq!(m.direction, Direction::Bullish);
        // stop at X's low
        assert!((m.stop_loss - 99.8).abs() < 1e-9);
        assert!(m.target_price > m.entry_price);
    }

    #[test]
    fn test_bearish_abcd() {
        let closes = knots(&[(0, 104.0), (12, 100.0), (22, 108.0), (30, 103.0), (40, 111.0)]);
        let m = run(&path(&closes)).unwrap();
        assert_eq!(m.pattern, PatternType::Abcd);
        assert_eq!(m.direction, Direction::Bearish);
        assert!(m.target_price < m.entry_price && m.stop_loss > m.entry_price);
    }

    #[test]
    fn test_stale_completion_ignored() {
        // same Gartley, then ten bars drifting sideways above D
        let mut closes = knots(&[
            (0, 104.0),
            (8, 100.0),
            (18, 110.0),
            (26, 103.82),
            (34, 107.5),
            (42, 102.14),
            (46, 103.0),
        ]);
        closes.extend([103.0; 6]);
        assert!(run(&path(&closes))
            .map_or(true, |m| m.pattern != PatternType::Gartley));
    }

    #[test]
    fn test_templates_do_not_share_d_bands() {
        for (i, a) in TEMPLATES.iter().enumerate() {
            for b in &TEMPLATES[i + 1..] {
                let overlap_b = a.b.0 <= b.b.1 && b.b.0 <= a.b.1;
                let overlap_d = a.d.0 <= b.d.1 && b.d.0 <= a.d.1;
                assert!(!(overlap_b && overlap_d), "{:?} / {:?}", a.pattern, b.pattern);
            }
        }
    }
}
