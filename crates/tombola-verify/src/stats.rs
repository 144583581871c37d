use crate::model::ChiSquare;

/// Chi-square of observed counts against a uniform `expected` count.
///
/// `df = max(k - 1, 1)`; the p-value uses the Wilson–Hilferty cube-root
/// normal approximation. Values are rounded to six decimals so reports stay
/// byte-stable.
pub fn chi_square(observed: &[u64], expected: f64) -> ChiSquare {
    let df = (observed.len() as u64).saturating_sub(1).max(1);
    let stat = if expected > 0.0 {
        observed
            .iter()
            .map(|count| {
                let diff = *count as f64 - expected;
                diff * diff / expected
            })
            .sum()
    } else {
        0.0
    };
    ChiSquare {
        stat: round6(stat),
        df,
        p_value: round6(wilson_hilferty_p(stat, df)),
    }
}

/// Upper-tail probability of a chi-square statistic.
pub fn wilson_hilferty_p(stat: f64, df: u64) -> f64 {
    let k = df as f64;
    let spread = 2.0 / (9.0 * k);
    let z = ((stat / k).cbrt() - (1.0 - spread)) / spread.sqrt();
    (1.0 - normal_cdf(z)).clamp(0.0, 1.0)
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz–Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
