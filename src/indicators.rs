//! Technical indicators shared by the detector catalog
//!
//! Every function is pure and works on plain `f64` series ordered oldest to newest.
//! Too few samples yields `None` (or an empty series). The only fabricated values are
//! RSI = 100 when the average loss is zero and Stochastic = 50 on a flat range.

use serde::{Deserialize, Serialize};

// ============================================================
// AVERAGES
// ============================================================

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average series seeded with the SMA of the first `period` values.
///
/// Element `j` of the output lines up with `values[period - 1 + j]`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev += alpha * (v - prev);
        out.push(prev);
    }
    out
}

/// Latest EMA value.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied()
}

/// Population standard deviation. Zero for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

// ============================================================
// OSCILLATORS
// ============================================================

#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// RSI series with Wilder smoothing.
///
/// Element `j` lines up with `closes[period + j]`.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }
    let p = period as f64;

    let (gain, loss) = closes[..=period].windows(2).fold((0.0, 0.0), |(g, l), w| {
        let change = w[1] - w[0];
        if change > 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });
    let mut avg_gain = gain / p;
    let mut avg_loss = loss / p;

    let mut out = Vec::with_capacity(closes.len() - period);
    out.push(rsi_value(avg_gain, avg_loss));

    for w in closes[period..].windows(2) {
        let change = w[1] - w[0];
        let (g, l) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (p - 1.0) + g) / p;
        avg_loss = (avg_loss * (p - 1.0) + l) / p;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

/// Latest RSI value (Wilder, usually `period = 14`).
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied()
}

/// One MACD sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD series. The first element lines up with `closes[max(fast, slow) + signal - 2]`.
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<Macd> {
    if fast == 0 || slow == 0 || signal == 0 {
        return Vec::new();
    }
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    if fast_ema.is_empty() || slow_ema.is_empty() {
        return Vec::new();
    }

    let start = fast.max(slow) - 1;
    let line: Vec<f64> = (start..closes.len())
        .map(|i| fast_ema[i + 1 - fast] - slow_ema[i + 1 - slow])
        .collect();

    let signal_line = ema_series(&line, signal);
    if signal_line.is_empty() {
        return Vec::new();
    }

    line[signal - 1..]
        .iter()
        .zip(signal_line)
        .map(|(&macd, signal)| Macd {
            macd,
            signal,
            histogram: macd - signal,
        })
        .collect()
}

/// Latest MACD sample (usually 12/26/9).
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    macd_series(closes, fast, slow, signal).last().copied()
}

/// Stochastic %K of the last bar over `period` bars.
pub fn stochastic(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if period == 0 || n < period || highs.len() != n || lows.len() != n {
        return None;
    }
    let highest = highs[n - period..].iter().copied().fold(f64::MIN, f64::max);
    let lowest = lows[n - period..].iter().copied().fold(f64::MAX, f64::min);
    let range = highest - lowest;
    if range <= 0.0 {
        return Some(50.0);
    }
    Some((closes[n - 1] - lowest) / range * 100.0)
}

/// %K for every bar that has a full lookback. Element `j` lines up with `closes[period - 1 + j]`.
pub fn stochastic_series(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    if period == 0 || n < period || highs.len() != n || lows.len() != n {
        return Vec::new();
    }
    (period..=n)
        .filter_map(|end| stochastic(&highs[..end], &lows[..end], &closes[..end], period))
        .collect()
}

// ============================================================
// BANDS & VOLATILITY
// ============================================================

/// Bollinger Bands at the last bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Band width relative to the middle band. Zero when the middle band is zero.
    pub fn bandwidth(&self) -> f64 {
        if self.middle.abs() > f64::EPSILON {
            (self.upper - self.lower) / self.middle
        } else {
            0.0
        }
    }
}

/// SMA ± k · population standard deviation over the last `period` closes.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    let middle = sma(closes, period)?;
    let sd = std_dev(&closes[closes.len() - period..]);
    Some(BollingerBands {
        upper: middle + k * sd,
        middle,
        lower: middle - k * sd,
    })
}

#[inline]
fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// Wilder ATR series. Element `j` lines up with bar `period + j`.
pub fn atr_series(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    if period == 0 || n < period + 1 || highs.len() != n || lows.len() != n {
        return Vec::new();
    }
    let tr: Vec<f64> = (1..n)
        .map(|i| true_range(highs[i], lows[i], closes[i - 1]))
        .collect();

    let p = period as f64;
    let mut prev = tr[..period].iter().sum::<f64>() / p;
    let mut out = Vec::with_capacity(tr.len() - period + 1);
    out.push(prev);
    for &t in &tr[period..] {
        prev = (prev * (p - 1.0) + t) / p;
        out.push(prev);
    }
    out
}

/// Latest Wilder ATR.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    atr_series(highs, lows, closes, period).last().copied()
}

// ============================================================
// TREND LINES
// ============================================================

/// Ordinary least-squares line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl TrendLine {
    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// OLS fit over arbitrary `(x, y)` points. `None` for fewer than two distinct x values.
pub fn fit_line(points: &[(f64, f64)]) -> Option<TrendLine> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let ss_tot: f64 = points.iter().map(|p| (p.1 - mean_y).powi(2)).sum();
    let ss_res: f64 = points
        .iter()
        .map(|p| (p.1 - (intercept + slope * p.0)).powi(2))
        .sum();
    let r_squared = if ss_tot > f64::EPSILON {
        1.0 - ss_res / ss_tot
    } else {
        1.0
    };

    Some(TrendLine {
        slope,
        intercept,
        r_squared,
    })
}

/// OLS fit over `(index, value)` pairs.
pub fn linear_regression(values: &[f64]) -> Option<TrendLine> {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();
    fit_line(&points)
}

// ============================================================
// PEAKS, TROUGHS, SWINGS
// ============================================================

fn extrema(values: &[f64], min_distance: usize, beats: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    if min_distance == 0 || values.len() < 2 * min_distance + 1 {
        return Vec::new();
    }
    (min_distance..values.len() - min_distance)
        .filter(|&i| {
            (i - min_distance..=i + min_distance).all(|j| j == i || beats(values[i], values[j]))
        })
        .collect()
}

/// Indices strictly above every point within `min_distance` on both sides.
pub fn find_peaks(values: &[f64], min_distance: usize) -> Vec<usize> {
    extrema(values, min_distance, |a, b| a > b)
}

/// Indices strictly below every point within `min_distance` on both sides.
pub fn find_troughs(values: &[f64], min_distance: usize) -> Vec<usize> {
    extrema(values, min_distance, |a, b| a < b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed (or terminal) pivot in a zig-zag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swing {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// Alternating swing highs/lows. Consecutive pivots of the same kind keep the more extreme one.
pub fn swing_points(highs: &[f64], lows: &[f64], min_distance: usize) -> Vec<Swing> {
    let mut swings: Vec<Swing> = find_peaks(highs, min_distance)
        .into_iter()
        .map(|index| Swing {
            index,
            price: highs[index],
            kind: SwingKind::High,
        })
        .chain(find_troughs(lows, min_distance).into_iter().map(|index| Swing {
            index,
            price: lows[index],
            kind: SwingKind::Low,
        }))
        .collect();
    swings.sort_by_key(|s| s.index);

    let mut out: Vec<Swing> = Vec::with_capacity(swings.len());
    for s in swings {
        match out.last_mut() {
            Some(last) if last.kind == s.kind => {
                let more_extreme = match s.kind {
                    SwingKind::High => s.price > last.price,
                    SwingKind::Low => s.price < last.price,
                };
                if more_extreme {
                    *last = s;
                }
            }
            _ => out.push(s),
        }
    }
    out
}

/// Swing points plus an unconfirmed terminal pivot: the most extreme bar after the last
/// confirmed swing, in the opposite direction.
pub fn zigzag(highs: &[f64], lows: &[f64], min_distance: usize) -> Vec<Swing> {
    let mut swings = swing_points(highs, lows, min_distance);
    let Some(last) = swings.last().copied() else {
        return swings;
    };
    let tail_start = last.index + 1;
    if tail_start >= lows.len() || tail_start >= highs.len() {
        return swings;
    }

    let terminal = match last.kind {
        SwingKind::High => lows[tail_start..]
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (i, &v)| match best {
                Some((_, b)) if b <= v => best,
                _ => Some((tail_start + i, v)),
            })
            .filter(|&(_, v)| v < last.price)
            .map(|(index, price)| Swing {
                index,
                price,
                kind: SwingKind::Low,
            }),
        SwingKind::Low => highs[tail_start..]
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |best, (i, &v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((tail_start + i, v)),
            })
            .filter(|&(_, v)| v > last.price)
            .map(|(index, price)| Swing {
                index,
                price,
                kind: SwingKind::High,
            }),
    };
    swings.extend(terminal);
    swings
}

// ============================================================
// VOLUME & CLOUD
// ============================================================

/// Volume-weighted average of the typical price over the whole window.
pub fn vwap(highs: &[f64], lows: &[f64], closes: &[f64], volumes: &[f64]) -> Option<f64> {
    let n = closes.len();
    if n == 0 || highs.len() != n || lows.len() != n || volumes.len() != n {
        return None;
    }
    let (pv, v) = (0..n).fold((0.0, 0.0), |(pv, v), i| {
        let typical = (highs[i] + lows[i] + closes[i]) / 3.0;
        (pv + typical * volumes[i], v + volumes[i])
    });
    (v > 0.0).then(|| pv / v)
}

/// Cumulative accumulation/distribution line. Flat bars contribute nothing.
pub fn accumulation_distribution(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    volumes: &[f64],
) -> Vec<f64> {
    let n = closes.len();
    if highs.len() != n || lows.len() != n || volumes.len() != n {
        return Vec::new();
    }
    let mut total = 0.0;
    (0..n)
        .map(|i| {
            let range = highs[i] - lows[i];
            if range > 0.0 {
                let multiplier = ((closes[i] - lows[i]) - (highs[i] - closes[i])) / range;
                total += multiplier * volumes[i];
            }
            total
        })
        .collect()
}

/// Ichimoku lines at the last bar (spans are not shifted forward)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ichimoku {
    pub tenkan: f64,
    pub kijun: f64,
    pub span_a: f64,
    pub span_b: f64,
}

impl Ichimoku {
    pub fn cloud_top(&self) -> f64 {
        self.span_a.max(self.span_b)
    }

    pub fn cloud_bottom(&self) -> f64 {
        self.span_a.min(self.span_b)
    }
}

fn midpoint(highs: &[f64], lows: &[f64], period: usize) -> f64 {
    let n = highs.len();
    let hh = highs[n - period..].iter().copied().fold(f64::MIN, f64::max);
    let ll = lows[n - period..].iter().copied().fold(f64::MAX, f64::min);
    (hh + ll) / 2.0
}

/// Ichimoku 9/26/52. Needs 52 bars.
pub fn ichimoku(highs: &[f64], lows: &[f64]) -> Option<Ichimoku> {
    if highs.len() < 52 || lows.len() != highs.len() {
        return None;
    }
    let tenkan = midpoint(highs, lows, 9);
    let kijun = midpoint(highs, lows, 26);
    Some(Ichimoku {
        tenkan,
        kijun,
        span_a: (tenkan + kijun) / 2.0,
        span_b: midpoint(highs, lows, 52),
    })
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    fn falling(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 - i as f64 * 0.5).collect()
    }

    #[test]
    fn test_sma_and_insufficient_data() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(sma(&[1.0], 2), None);
        assert_eq!(sma(&[1.0], 0), None);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let series = ema_series(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_eq!(series.len(), 2);
        assert!((series[0] - 4.0).abs() < 1e-12);
        assert!((series[1] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_rising_and_falling() {
        let up = rsi(&rising(30), 14).unwrap();
        assert!(up > 50.0);
        assert!((up - 100.0).abs() < 1e-9);

        let down = rsi(&falling(30), 14).unwrap();
        assert!(down < 1e-9);

        assert!(rsi(&rising(14), 14).is_none());
    }

    #[test]
    fn test_rsi_mixed_between_bounds() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0 + i as f64 * 0.1)
            .collect();
        let value = rsi(&closes, 14).unwrap();
        assert!(value > 0.0 && value < 100.0);
    }

    #[test]
    fn test_macd_alignment() {
        let closes = rising(40);
        let series = macd_series(&closes, 12, 26, 9);
        assert_eq!(series.len(), 40 - 26 - 9 + 2);
        let last = series.last().unwrap();
        assert!(last.macd > 0.0);
        assert!((last.histogram - (last.macd - last.signal)).abs() < 1e-12);
        assert!(macd(&closes[..30], 12, 26, 9).is_none());
    }

    #[test]
    fn test_stochastic_flat_is_fifty() {
        let flat = vec![10.0; 14];
        assert_eq!(stochastic(&flat, &flat, &flat, 14), Some(50.0));
    }

    #[test]
    fn test_stochastic_at_high() {
        let highs = rising(14);
        let lows: Vec<f64> = highs.iter().map(|h| h - 2.0).collect();
        let k = stochastic(&highs, &lows, &highs, 14).unwrap();
        assert!((k - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_population_std() {
        let closes = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bands = bollinger(&closes, 8, 2.0).unwrap();
        assert!((bands.middle - 5.0).abs() < 1e-12);
        assert!((bands.upper - 9.0).abs() < 1e-12);
        assert!((bands.lower - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_atr_constant_range() {
        let highs = vec![11.0; 20];
        let lows = vec![9.0; 20];
        let closes = vec![10.0; 20];
        assert!((atr(&highs, &lows, &closes, 14).unwrap() - 2.0).abs() < 1e-12);
        assert!(atr(&highs[..14], &lows[..14], &closes[..14], 14).is_none());
    }

    #[test]
    fn test_linear_regression_exact() {
        let line = linear_regression(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((line.slope - 2.0).abs() < 1e-12);
        assert!((line.intercept - 1.0).abs() < 1e-12);
        assert!((line.r_squared - 1.0).abs() < 1e-12);
        assert!(linear_regression(&[1.0]).is_none());
    }

    #[test]
    fn test_peaks_are_strict() {
        let values = [1.0, 2.0, 5.0, 2.0, 1.0, 3.0, 3.0, 1.0, 0.5];
        assert_eq!(find_peaks(&values, 2), vec![2]);
        assert_eq!(find_troughs(&values, 1), vec![4]);
        assert!(find_peaks(&values[..3], 2).is_empty());
    }

    #[test]
    fn test_zigzag_alternates() {
        let highs = [1.0, 3.0, 1.5, 1.0, 4.0, 2.0, 1.0, 0.8];
        let lows: Vec<f64> = highs.iter().map(|h| h - 0.5).collect();
        let swings = zigzag(&highs, &lows, 1);
        assert!(swings.windows(2).all(|w| w[0].kind != w[1].kind));
        assert_eq!(swings.last().map(|s| s.kind), Some(SwingKind::Low));
    }

    #[test]
    fn test_vwap_and_ad_line() {
        let highs = [11.0, 12.0];
        let lows = [9.0, 10.0];
        let closes = [11.0, 10.0];
        let volumes = [100.0, 300.0];
        let v = vwap(&highs, &lows, &closes, &volumes).unwrap();
        let expected = ((31.0 / 3.0) * 100.0 + (32.0 / 3.0) * 300.0) / 400.0;
        assert!((v - expected).abs() < 1e-12);

        let ad = accumulation_distribution(&highs, &lows, &closes, &volumes);
        assert_eq!(ad, vec![100.0, -200.0]);
        assert!(vwap(&highs, &lows, &closes, &[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_ichimoku_requires_52() {
        let highs = rising(52);
        let lows: Vec<f64> = highs.iter().map(|h| h - 1.0).collect();
        let cloud = ichimoku(&highs, &lows).unwrap();
        assert!(cloud.tenkan > cloud.kijun);
        assert!(ichimoku(&highs[..51], &lows[..51]).is_none());
    }
}
