//! Two-sample tests used for convergence detection.
//!
//! - **Mann-Whitney U**: rank-sum test on score location, normal
//!   approximation with tie and continuity correction, two-sided.
//! - **Levene**: equality of variances, mean-centred, F(1, n - 2) tail.
//!
//! Both return a [`TestOutcome`]. Degenerate inputs (empty samples, zero
//! spread) yield `p_value = 1.0`, i.e. no evidence of a difference.

use serde::Serialize;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

impl TestOutcome {
    fn no_evidence(statistic: f64) -> Self {
        Self {
            statistic,
            p_value: 1.0,
        }
    }
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Mann-Whitney U of `a` against `b`. The statistic is U for `a`.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> TestOutcome {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return TestOutcome::no_evidence(0.0);
    }

    let mut pooled: Vec<(f64, bool)> = a
        .iter()
        .map(|&x| (x, true))
        .chain(b.iter().map(|&x| (x, false)))
        .collect();
    pooled.sort_by(|x, y| x.0.total_cmp(&y.0));

    let n = pooled.len();
    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        // average of 1-based ranks i+1..=j+1
        let rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum_a += pooled[i..=j].iter().filter(|(_, in_a)| *in_a).count() as f64 * rank;
        let t = (j - i + 1) as f64;
        tie_term += t * t * t - t;
        i = j + 1;
    }

    let (n1f, n2f, nf) = (n1 as f64, n2 as f64, n as f64);
    let u = rank_sum_a - n1f * (n1f + 1.0) / 2.0;
    let mu = n1f * n2f / 2.0;
    let variance = n1f * n2f / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)));
    if variance <= 0.0 {
        return TestOutcome::no_evidence(u);
    }
    let z = ((u - mu).abs() - 0.5).max(0.0) / variance.sqrt();
    TestOutcome {
        statistic: u,
        p_value: erfc(z / 2f64.sqrt()).clamp(0.0, 1.0),
    }
}

/// Levene's test for equal variances of `a` and `b`.
pub fn levene(a: &[f64], b: &[f64]) -> TestOutcome {
    if a.len() < 2 || b.len() < 2 {
        return TestOutcome::no_evidence(0.0);
    }

    let deviations = |xs: &[f64]| -> Vec<f64> {
        let m = mean(xs);
        xs.iter().map(|x| (x - m).abs()).collect()
    };
    let za = deviations(a);
    let zb = deviations(b);
    let (mean_a, mean_b) = (mean(&za), mean(&zb));
    let n = (za.len() + zb.len()) as f64;
    let grand = (za.iter().sum::<f64>() + zb.iter().sum::<f64>()) / n;

    let between = za.len() as f64 * (mean_a - grand).powi(2)
        + zb.len() as f64 * (mean_b - grand).powi(2);
    let within = za.iter().map(|z| (z - mean_a).powi(2)).sum::<f64>()
        + zb.iter().map(|z| (z - mean_b).powi(2)).sum::<f64>();

    let df2 = n - 2.0;
    if within == 0.0 {
        return if between == 0.0 {
            TestOutcome::no_evidence(0.0)
        } else {
            TestOutcome {
                statistic: f64::INFINITY,
                p_value: 0.0,
            }
        };
    }
    let w = df2 * between / within;
    TestOutcome {
        statistic: w,
        p_value: f_distribution_sf(w, 1.0, df2),
    }
}

/// Upper tail of the F distribution, via the regularised incomplete beta.
pub fn f_distribution_sf(f: f64, df1: f64, df2: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    let x = df2 / (df2 + df1 * f);
    incomplete_beta(df2 / 2.0, df1 / 2.0, x).clamp(0.0, 1.0)
}

const ERFC_COEFFICIENTS: [f64; 10] = [
    -1.265_512_23,
    1.000_023_68,
    0.374_091_96,
    0.096_784_18,
    -0.186_288_06,
    0.278_868_07,
    -1.135_203_98,
    1.488_515_87,
    -0.822_152_23,
    0.170_872_77,
];

/// Complementary error function, fractional error below 1.2e-7.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = ERFC_COEFFICIENTS
        .iter()
        .rev()
        .fold(0.0, |acc, c| c + t * acc)
        - z * z;
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// ln Γ(x) for x > 0 (Lanczos).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularised incomplete beta I_x(a, b).
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta (modified Lentz).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-12;
    const TINY: f64 = 1e-30;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn special_functions() {
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-12));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-12));
        assert!(close(incomplete_beta(2.0, 3.0, 0.4), 0.5248, 1e-10));
        assert!(close(erfc(0.0), 1.0, 1e-7));
        assert!(close(erfc(-1.0), 2.0 - erfc(1.0), 1e-12));
        assert!(close(erfc(1.0), 0.157_299_207, 1e-7));
    }

    #[test]
    fn mann_whitney_separated_samples() {
        let out = mann_whitney_u(&[1.0, 2.0, 3.0, 4.0, 5.0], &[6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(out.statistic, 0.0);
        assert!(close(out.p_value, 0.012_185_8, 1e-5));
    }

    #[test]
    fn mann_whitney_with_ties() {
        let out = mann_whitney_u(&[1.0, 2.0, 3.0, 4.0, 5.0], &[3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(out.statistic, 4.5);
        assert!(close(out.p_value, 0.113_846_3, 1e-5));
    }

    #[test]
    fn mann_whitney_degenerate_inputs() {
        assert_eq!(mann_whitney_u(&[], &[1.0]).p_value, 1.0);
        assert_eq!(mann_whitney_u(&[2.0, 2.0], &[2.0, 2.0]).p_value, 1.0);
    }

    #[test]
    fn levene_mean_centred() {
        let out = levene(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 6.0, 8.0, 10.0]);
        assert!(close(out.statistic, 2.057_142_857, 1e-6));
        assert!(close(out.p_value, 0.189_403_66, 1e-5));
    }

    #[test]
    fn levene_detects_unequal_spread() {
        let out = levene(
            &[10.0, 10.1, 9.9, 10.0, 10.05, 9.95],
            &[0.0, 20.0, -5.0, 25.0, 3.0, 17.0],
        );
        assert!(close(out.statistic, 51.748, 1e-2));
        assert!(out.p_value < 1e-4);
    }

    #[test]
    fn levene_degenerate_inputs() {
        let same = [1.0, 2.0, 3.0];
        assert_eq!(levene(&same, &same).p_value, 1.0);
        assert_eq!(levene(&[1.0], &same).p_value, 1.0);
        assert_eq!(levene(&[4.0, 4.0], &[4.0, 4.0]).p_value, 1.0);
        let out = levene(&[1.0, 3.0], &[5.0, 5.0]);
        assert_eq!(out.p_value, 0.0);
    }
}
